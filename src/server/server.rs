use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_mysql::*;
use crate::infra_redis::*;
use crate::logger::*;
use crate::settings::Settings;
use anyhow::{Context, anyhow};
use sqlx::{MySql, Pool};
use std::sync::Arc;
use std::time::Duration;

/// The services behind the HTTP routes, wired for one storage backend.
pub struct Server {
    pub auth_service: Arc<dyn AuthService>,
    pub membership_service: Arc<dyn MembershipService>,
    pool: Option<Pool<MySql>>,
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let jwt = JwtConfig {
            issuer: settings.auth.issuer.clone(),
            access_audience: settings.auth.access_audience.clone(),
            refresh_audience: settings.auth.refresh_audience.clone(),
            access_ttl: Duration::from_secs(settings.auth.access_ttl_secs),
            refresh_ttl: Duration::from_secs(settings.auth.refresh_ttl_secs),
            access_key: signing_key(&settings.auth.access_key_env)?,
            refresh_key: signing_key(&settings.auth.refresh_key_env)?,
        };
        if jwt.access_key == jwt.refresh_key {
            return Err(anyhow!("access and refresh signing keys must differ"));
        }

        let server = match settings.storage.backend.as_str() {
            "memory" => Self::in_memory(jwt, settings.auth.rotate_refresh),
            "mysql" => {
                let mysql_dsn = settings
                    .storage
                    .mysql_dsn
                    .as_deref()
                    .ok_or_else(|| anyhow!("storage.mysql_dsn is required for mysql backend"))?;
                let redis_dsn = settings
                    .storage
                    .redis_dsn
                    .as_deref()
                    .ok_or_else(|| anyhow!("storage.redis_dsn is required for mysql backend"))?;

                let redis_client = redis::Client::open(redis_dsn)?;
                let redis_manager = redis_client.get_connection_manager().await?;
                let credential_store: Arc<dyn CredentialStore> = Arc::new(
                    RedisCredentialStore::new(redis_manager, settings.storage.credential_prefix.clone()),
                );

                let pool = Pool::<MySql>::connect(mysql_dsn)
                    .await
                    .context("connect to mysql")?;
                MIGRATOR.run(&pool).await.context("apply mysql migrations")?;
                info!("mysql schema is up to date");
                let user_repo: Arc<dyn UserRepo> = Arc::new(MySqlUserRepo::new(pool.clone()));
                let membership_repo: Arc<dyn MembershipRepo> =
                    Arc::new(MySqlMembershipRepo::new(pool.clone()));

                Self::assemble(
                    jwt,
                    settings.auth.rotate_refresh,
                    credential_store,
                    user_repo,
                    membership_repo,
                    Some(pool),
                )
            }
            other => return Err(anyhow!("Unknown storage backend: {}", other)),
        };

        info!(backend = %settings.storage.backend, "server started");
        Ok(server)
    }

    /// Everything in process memory; state is lost on restart.
    pub fn in_memory(jwt: JwtConfig, rotate_refresh: bool) -> Self {
        Self::assemble(
            jwt,
            rotate_refresh,
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(MemoryUserRepo::new()),
            Arc::new(MemoryMembershipRepo::new()),
            None,
        )
    }

    fn assemble(
        jwt: JwtConfig,
        rotate_refresh: bool,
        credential_store: Arc<dyn CredentialStore>,
        user_repo: Arc<dyn UserRepo>,
        membership_repo: Arc<dyn MembershipRepo>,
        pool: Option<Pool<MySql>>,
    ) -> Self {
        let token_codec: Arc<dyn TokenCodec> = Arc::new(JwtHs256Codec::new(jwt));
        let credential_hasher: Arc<dyn CredentialHasher> = Arc::new(Argon2PasswordHasher);
        let issuer = Arc::new(TokenIssuer::new(
            token_codec,
            credential_store,
            rotate_refresh,
        ));

        let auth_service: Arc<dyn AuthService> =
            Arc::new(RealAuthService::new(
                user_repo,
                membership_repo.clone(),
                credential_hasher,
                issuer,
            ));
        let membership_service: Arc<dyn MembershipService> =
            Arc::new(RealMembershipService::new(membership_repo));

        Self {
            auth_service,
            membership_service,
            pool,
        }
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}

fn signing_key(env_name: &str) -> anyhow::Result<Vec<u8>> {
    match std::env::var(env_name) {
        Ok(key) if !key.is_empty() => Ok(key.into_bytes()),
        _ if cfg!(debug_assertions) => {
            warn!(env = env_name, "signing key not set, using a development key");
            Ok(format!("marquee-dev-{env_name}").into_bytes())
        }
        _ => Err(anyhow!("signing key environment variable {} is not set", env_name)),
    }
}
