use redis::RedisResult;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Fixed-window counter: returns false once `key` has been hit more than
    /// `limit` times within the current window.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_malformed_url() {
        assert!(RedisClient::new("not a redis url").is_err());
    }

    #[tokio::test]
    #[ignore = "requires a running Redis at REDIS_URL"]
    async fn test_limit_trips_after_threshold() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".into());
        let client = RedisClient::new(&url).unwrap();
        let key = format!("rate:test:{}", uuid::Uuid::new_v4());

        assert!(client.check_rate_limit(&key, 2, 60).await.unwrap());
        assert!(client.check_rate_limit(&key, 2, 60).await.unwrap());
        assert!(!client.check_rate_limit(&key, 2, 60).await.unwrap());
    }
}
