//! Read-through cache for seat map views.
//!
//! The cache is never authoritative: seat mutations go to the store and the
//! coordinator drops the cached view after every committed change. Redis
//! failures are logged and otherwise ignored.
//!
//! Each showtime has a generation counter that invalidation bumps. A view is
//! stored together with the generation read before it was loaded and is only
//! served while that generation is still current, so a reader that loaded
//! the seat map before a commit cannot put its view back over the
//! invalidation.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::SeatMapView;
use crate::redis_client::RedisClient;

#[derive(Clone)]
pub struct CacheService {
    redis: RedisClient,
    ttl_seconds: u64,
}

#[derive(Debug)]
pub enum SeatMapLookup {
    Hit(SeatMapView),
    /// `generation` stamps a view loaded from the store after this lookup;
    /// `None` when the counter could not be read and the view must not be
    /// cached.
    Miss { generation: Option<u64> },
}

#[derive(Serialize)]
struct CachedSeatMapRef<'a> {
    generation: u64,
    view: &'a SeatMapView,
}

#[derive(Deserialize)]
struct CachedSeatMap {
    generation: u64,
    view: SeatMapView,
}

impl CacheService {
    pub fn new(redis: RedisClient, ttl_seconds: u64) -> Self {
        Self { redis, ttl_seconds }
    }

    pub async fn get_seat_map(&self, showtime_id: Uuid) -> SeatMapLookup {
        let generation = match self.redis.counter(&generation_key(showtime_id)).await {
            Ok(generation) => generation,
            Err(e) => {
                warn!(%showtime_id, error = %e, "Seat map generation read failed");
                return SeatMapLookup::Miss { generation: None };
            }
        };

        match self.redis.get_json::<CachedSeatMap>(&seat_map_key(showtime_id)).await {
            Ok(Some(entry)) if entry.generation == generation => {
                debug!(%showtime_id, generation, "Seat map cache hit");
                SeatMapLookup::Hit(entry.view)
            }
            Ok(_) => SeatMapLookup::Miss {
                generation: Some(generation),
            },
            Err(e) => {
                warn!(%showtime_id, error = %e, "Seat map cache read failed");
                SeatMapLookup::Miss {
                    generation: Some(generation),
                }
            }
        }
    }

    pub async fn put_seat_map(&self, view: &SeatMapView, generation: u64) {
        let entry = CachedSeatMapRef { generation, view };
        if let Err(e) = self
            .redis
            .set_json(&seat_map_key(view.showtime_id), &entry, self.ttl_seconds)
            .await
        {
            warn!(showtime_id = %view.showtime_id, error = %e, "Seat map cache write failed");
        }
    }

    pub async fn invalidate_seat_map(&self, showtime_id: Uuid) {
        if let Err(e) = self.redis.increment(&generation_key(showtime_id)).await {
            warn!(%showtime_id, error = %e, "Seat map generation bump failed");
        }
        if let Err(e) = self.redis.delete(&seat_map_key(showtime_id)).await {
            warn!(%showtime_id, error = %e, "Seat map cache invalidation failed");
        }
    }

    pub async fn ping(&self) -> bool {
        self.redis.ping().await.is_ok()
    }
}

fn seat_map_key(showtime_id: Uuid) -> String {
    format!("seats:{showtime_id}")
}

fn generation_key(showtime_id: Uuid) -> String {
    format!("seats:{showtime_id}:generation")
}
