//! Client and server together: the client talks to the real routes through
//! `warp::test`, backed by the in-memory stores.

use marquee::api;
use marquee::application_impl::JwtConfig;
use marquee::application_port::{AccessToken, AuthTokens, RefreshToken};
use marquee::client::*;
use marquee::domain_model::{ListKind, MembershipEntry};
use marquee::server::Server;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use warp::Filter;
use warp::filters::BoxedFilter;

struct WarpTransport {
    filter: BoxedFilter<(Box<dyn warp::Reply>,)>,
}

impl WarpTransport {
    fn new(server: Arc<Server>) -> Arc<Self> {
        let filter = warp::path("api")
            .and(warp::path("v1"))
            .and(api::v1::routes(server))
            .recover(api::v1::recover_error)
            .map(|reply| Box::new(reply) as Box<dyn warp::Reply>)
            .boxed();
        Arc::new(WarpTransport { filter })
    }
}

#[async_trait::async_trait]
impl Transport for WarpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiReply, ClientError> {
        let method = match request.method {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        let mut builder = warp::test::request()
            .method(method)
            .path(&format!("/api/v1{}", request.path));
        if let Some(token) = &request.bearer {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let response = builder.reply(&self.filter).await;
        Ok(ApiReply {
            status: response.status().as_u16(),
            body: serde_json::from_slice(response.body()).unwrap_or(Value::Null),
        })
    }
}

fn jwt_config(access_ttl: Duration) -> JwtConfig {
    JwtConfig {
        issuer: "marquee.test".to_string(),
        access_audience: "marquee-access".to_string(),
        refresh_audience: "marquee-refresh".to_string(),
        access_ttl,
        refresh_ttl: Duration::from_secs(24 * 60 * 60),
        access_key: b"access-test-key".to_vec(),
        refresh_key: b"refresh-test-key".to_vec(),
    }
}

fn client_for(transport: &Arc<WarpTransport>) -> ApiClient {
    let session = SessionClient::with_persistence(&Persistence::Memory);
    ApiClient::new(transport.clone(), session)
}

fn ada() -> RegisterForm {
    RegisterForm {
        firstname: "Ada".to_string(),
        lastname: "Lovelace".to_string(),
        email: "ada@example.com".to_string(),
        password: "analytical".to_string(),
    }
}

/// Reinstalls the current pair with a long client-side lifetime, as a client
/// whose clock lags the server's would hold it.
fn stretch_client_lifetime(client: &ApiClient) {
    let record = client.session().record().unwrap();
    let tokens = AuthTokens {
        access_token: AccessToken(record.access_token),
        refresh_token: RefreshToken(record.refresh_token),
        access_token_expires_at: record.expires_at,
        access_token_ttl_secs: 3600,
        refresh_token_expires_at: record.expires_at,
    };
    client.session().set_session(record.principal, &tokens).unwrap();
}

#[tokio::test]
async fn register_login_profile_logout() {
    let server = Arc::new(Server::in_memory(jwt_config(Duration::from_secs(1800)), false));
    let transport = WarpTransport::new(server);
    let client = client_for(&transport);

    let registered = client.register(&ada()).await.unwrap();
    assert!(client.session().is_authenticated());
    assert_eq!(client.profile().await.unwrap(), registered);

    assert!(matches!(
        client.register(&ada()).await,
        Err(ClientError::Conflict(_))
    ));

    client.logout().await.unwrap();
    assert!(!client.session().is_authenticated());
    assert_eq!(
        client.profile().await.unwrap_err(),
        ClientError::Unauthenticated(api::v1::ApiErrorCode::MissingToken)
    );

    let again = client.login("ADA@example.com ", "analytical").await.unwrap();
    assert_eq!(again.id, registered.id);
    assert_eq!(
        client_for(&transport)
            .login("ada@example.com", "wrong-password")
            .await
            .unwrap_err(),
        ClientError::Unauthenticated(api::v1::ApiErrorCode::InvalidCredentials)
    );
}

#[tokio::test]
async fn expired_access_token_is_refreshed_and_the_call_replayed() {
    let server = Arc::new(Server::in_memory(jwt_config(Duration::from_secs(1)), false));
    let transport = WarpTransport::new(server);
    let client = client_for(&transport);
    client.register(&ada()).await.unwrap();
    stretch_client_lifetime(&client);
    let before = client.session().access_token().unwrap().1;
    let mut events = client.session().subscribe();

    tokio::time::sleep(Duration::from_millis(2100)).await;

    let profile = client.profile().await.unwrap();
    assert_eq!(profile.email, "ada@example.com");
    assert_eq!(events.recv().await.unwrap(), SessionEvent::Refreshed);
    assert_ne!(client.session().access_token().unwrap().1, before);
    assert_eq!(client.coordinator().state(), CoordinatorState::Idle);
}

#[tokio::test]
async fn a_newer_login_revokes_the_older_session() {
    let server = Arc::new(Server::in_memory(jwt_config(Duration::from_secs(1)), false));
    let transport = WarpTransport::new(server);

    let first = client_for(&transport);
    first.register(&ada()).await.unwrap();
    stretch_client_lifetime(&first);

    let second = client_for(&transport);
    second.login("ada@example.com", "analytical").await.unwrap();

    tokio::time::sleep(Duration::from_millis(2100)).await;

    assert_eq!(first.profile().await.unwrap_err(), ClientError::RefreshInvalid);
    assert!(!first.session().is_authenticated());
    assert_eq!(first.coordinator().state(), CoordinatorState::LoggedOut);
}

#[tokio::test]
async fn optimistic_toggles_against_the_real_routes() {
    let server = Arc::new(Server::in_memory(jwt_config(Duration::from_secs(1800)), false));
    let transport = WarpTransport::new(server);
    let client = client_for(&transport);
    client.register(&ada()).await.unwrap();

    let cache = OptimisticCache::new(Arc::new(client.clone()));
    let _follower = cache.follow(client.session());
    let entry = MembershipEntry::movie(42);

    let handle = cache.toggle(ListKind::Favorites, entry);
    assert_eq!(cache.members(ListKind::Favorites), HashSet::from([entry]));
    assert!(handle.settled().await.unwrap());
    assert_eq!(client.list(ListKind::Favorites).await.unwrap(), vec![entry]);
    assert!(client.list(ListKind::Watchlist).await.unwrap().is_empty());

    // A second client adds to the watchlist behind this cache's back, so the
    // optimistic add collides with the server and is rolled back.
    let other = MembershipEntry::tv(7);
    client.add(ListKind::Watchlist, other).await.unwrap();
    let handle = cache.toggle(ListKind::Watchlist, other);
    assert!(cache.contains(ListKind::Watchlist, other));
    assert!(matches!(
        handle.settled().await,
        Err(ClientError::Conflict(_))
    ));
    assert!(cache.members(ListKind::Watchlist).is_empty());

    assert_eq!(
        cache.load(ListKind::Watchlist).await.unwrap(),
        HashSet::from([other])
    );
    assert!(matches!(
        client.remove(ListKind::Favorites, MembershipEntry::tv(1)).await,
        Err(ClientError::NotFound(_))
    ));
    assert!(matches!(
        client.add(ListKind::Favorites, MembershipEntry::movie(0)).await,
        Err(ClientError::Validation(_))
    ));
}

#[tokio::test]
async fn guard_reports_distinct_wire_codes() {
    let server = Arc::new(Server::in_memory(jwt_config(Duration::from_secs(1800)), false));
    let transport = WarpTransport::new(server);

    let missing = transport.send(ApiRequest::get("/profile")).await.unwrap();
    assert_eq!(missing.status, 401);
    assert_eq!(
        missing.unauthenticated_code(),
        Some(api::v1::ApiErrorCode::MissingToken)
    );

    let garbage = transport
        .send(ApiRequest::get("/favorites").with_bearer("not.a.jwt"))
        .await
        .unwrap();
    assert_eq!(
        garbage.unauthenticated_code(),
        Some(api::v1::ApiErrorCode::InvalidToken)
    );
    assert!(!garbage.is_token_expired());

    let unknown_list = transport
        .send(ApiRequest::get("/bookmarks").with_bearer("not.a.jwt"))
        .await
        .unwrap();
    assert_eq!(unknown_list.status, 404);
}

#[tokio::test]
async fn profile_update_and_account_deletion() {
    let server = Arc::new(Server::in_memory(jwt_config(Duration::from_secs(1800)), false));
    let transport = WarpTransport::new(server);
    let client = client_for(&transport);
    let registered = client.register(&ada()).await.unwrap();

    let renamed = client
        .update_profile(&ProfileForm {
            firstname: Some("Augusta".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(renamed.firstname, "Augusta");
    assert_eq!(renamed.lastname, "Lovelace");
    assert_eq!(client.session().principal().unwrap().firstname, "Augusta");

    let epoch = client.session().epoch();
    client
        .update_profile(&ProfileForm {
            password: Some("difference engine".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(client.session().epoch() > epoch);
    assert_eq!(client.profile().await.unwrap().id, registered.id);
    assert_eq!(
        client_for(&transport)
            .login("ada@example.com", "analytical")
            .await
            .unwrap_err(),
        ClientError::Unauthenticated(api::v1::ApiErrorCode::InvalidCredentials)
    );

    let cache = OptimisticCache::new(Arc::new(client.clone()));
    cache
        .toggle(ListKind::Favorites, MembershipEntry::movie(42))
        .settled()
        .await
        .unwrap();

    client.delete_account().await.unwrap();
    assert!(!client.session().is_authenticated());
    assert_eq!(
        client_for(&transport)
            .login("ada@example.com", "difference engine")
            .await
            .unwrap_err(),
        ClientError::Unauthenticated(api::v1::ApiErrorCode::InvalidCredentials)
    );

    // Same email, new account, empty lists.
    let reborn = client.register(&ada()).await.unwrap();
    assert_ne!(reborn.id, registered.id);
    assert!(client.list(ListKind::Favorites).await.unwrap().is_empty());
}
