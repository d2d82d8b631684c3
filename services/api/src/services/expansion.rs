//! Site statistics and the Google access token, both kept warm in the cache
//! by background intervals.

use std::sync::Arc;
use std::time::Duration;

use common::cache::{CacheService, IntervalIo, IntervalOptions, TimeoutOptions, TimingOptions};
use common::error::{CacheResult, GoogleError};
use common::google::{Credentials, GoogleService};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ApiError, ApiResult};
use crate::repositories::{TagStore, UserStore};

pub const STATISTIC_CACHE_KEY: &str = "expansion:statistic";
pub const GOOGLE_TOKEN_CACHE_KEY: &str = "expansion:google-token";

/// Top of every hour
const STATISTIC_SCHEDULE: &str = "0 0 * * * *";
const STATISTIC_RETRY: Duration = Duration::from_secs(60 * 5);
const GOOGLE_TOKEN_REFRESH: Duration = Duration::from_secs(60 * 45);
const GOOGLE_TOKEN_RETRY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistic {
    pub tags: i64,
    pub users: i64,
}

async fn count_statistic(users: &dyn UserStore, tags: &dyn TagStore) -> anyhow::Result<Statistic> {
    Ok(Statistic {
        tags: tags.count().await?,
        users: users.count().await?,
    })
}

#[derive(Clone)]
pub struct ExpansionService {
    users: Arc<dyn UserStore>,
    tags: Arc<dyn TagStore>,
    statistic: IntervalIo<Statistic>,
    google_token: Option<IntervalIo<Credentials>>,
}

impl ExpansionService {
    /// Start the statistic and token intervals
    pub async fn start(
        cache: &CacheService,
        users: Arc<dyn UserStore>,
        tags: Arc<dyn TagStore>,
        google: GoogleService,
    ) -> CacheResult<Self> {
        let (producer_users, producer_tags) = (Arc::clone(&users), Arc::clone(&tags));
        let statistic = cache
            .interval_io(
                STATISTIC_CACHE_KEY,
                move || {
                    let users = Arc::clone(&producer_users);
                    let tags = Arc::clone(&producer_tags);
                    async move { count_statistic(users.as_ref(), tags.as_ref()).await }
                },
                IntervalOptions::Timing(TimingOptions::new(STATISTIC_SCHEDULE, STATISTIC_RETRY)),
            )
            .await?;

        let google_token = if google.is_initialized() {
            let token = cache
                .interval_io(
                    GOOGLE_TOKEN_CACHE_KEY,
                    move || {
                        let google = google.clone();
                        async move { Ok::<_, anyhow::Error>(google.get_credentials().await?) }
                    },
                    IntervalOptions::Timeout(
                        TimeoutOptions::every(GOOGLE_TOKEN_REFRESH).retry_after(GOOGLE_TOKEN_RETRY),
                    ),
                )
                .await?;
            Some(token)
        } else {
            warn!("[GoogleAPI] service account unavailable, token refresh disabled");
            None
        };

        Ok(Self {
            users,
            tags,
            statistic,
            google_token,
        })
    }

    /// Latest counts; computed on the spot when the cache is cold or down
    pub async fn statistic(&self) -> ApiResult<Statistic> {
        match self.statistic.get().await {
            Ok(Some(statistic)) => Ok(statistic),
            Ok(None) => Ok(self.statistic.update().await?),
            Err(e) => {
                warn!("[Expansion] cache unavailable, counting directly: {}", e);
                count_statistic(self.users.as_ref(), self.tags.as_ref())
                    .await
                    .map_err(ApiError::from_producer)
            }
        }
    }

    pub async fn google_token(&self) -> ApiResult<Credentials> {
        let token = self
            .google_token
            .as_ref()
            .ok_or(GoogleError::NotInitialized)?;
        match token.get().await? {
            Some(credentials) => Ok(credentials),
            None => Ok(token.update().await?),
        }
    }
}
