use super::guard::authenticate;
use super::handler;
use crate::domain_model::ListKind;
use crate::server::*;
use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, http};

pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let login = warp::post()
        .and(warp::path("auth"))
        .and(warp::path::end())
        .and(warp::body::json())
        .and(with(server.auth_service.clone()))
        .and_then(handler::login);

    let register = warp::post()
        .and(warp::path("register"))
        .and(warp::path::end())
        .and(warp::body::json())
        .and(with(server.auth_service.clone()))
        .and_then(handler::register);

    let refresh = warp::post()
        .and(warp::path("refresh-token"))
        .and(warp::path::end())
        .and(warp::body::bytes())
        .and(warp::header::optional::<String>(
            http::header::AUTHORIZATION.as_str(),
        ))
        .and(with(server.auth_service.clone()))
        .and_then(handler::refresh_token);

    let logout = warp::post()
        .and(warp::path("logout"))
        .and(warp::path::end())
        .and(authenticate(server.auth_service.clone()))
        .and(with(server.auth_service.clone()))
        .and_then(handler::logout);

    let profile = warp::get()
        .and(warp::path("profile"))
        .and(warp::path::end())
        .and(authenticate(server.auth_service.clone()))
        .and(with(server.auth_service.clone()))
        .and_then(handler::profile);

    let update_profile = warp::put()
        .and(warp::path("profile"))
        .and(warp::path::end())
        .and(authenticate(server.auth_service.clone()))
        .and(warp::body::json())
        .and(with(server.auth_service.clone()))
        .and_then(handler::update_profile);

    let delete_account = warp::delete()
        .and(warp::path("profile"))
        .and(warp::path::end())
        .and(authenticate(server.auth_service.clone()))
        .and(with(server.auth_service.clone()))
        .and_then(handler::delete_account);

    // /favorites and /watchlist share handlers; unknown kinds fall through to 404.
    let membership = warp::path::param::<ListKind>()
        .and(warp::path::end())
        .and(authenticate(server.auth_service.clone()));

    let list_members = warp::get()
        .and(membership.clone())
        .and(with(server.membership_service.clone()))
        .and_then(handler::list_members);

    let add_member = warp::post()
        .and(membership.clone())
        .and(warp::body::json())
        .and(with(server.membership_service.clone()))
        .and_then(handler::add_member);

    let remove_member = warp::delete()
        .and(membership)
        .and(warp::body::json())
        .and(with(server.membership_service.clone()))
        .and_then(handler::remove_member);

    login
        .or(register)
        .or(refresh)
        .or(logout)
        .or(profile)
        .or(update_profile)
        .or(delete_account)
        .or(list_members)
        .or(add_member)
        .or(remove_member)
        .with(warp::trace::request())
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}
