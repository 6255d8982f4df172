use redis::aio::ConnectionManager;
use redis::RedisResult;

/// Creates a single `ConnectionManager` that auto-reconnects on failure.
///
/// `ConnectionManager` is cheaply cloneable; every clone shares the same
/// underlying multiplexed TCP connection, so the redirect store and the
/// analytics sink each hold their own clone.
pub async fn connect(url: &str) -> RedisResult<ConnectionManager> {
    let client = redis::Client::open(url)?;
    let conn = ConnectionManager::new(client).await?;
    tracing::info!("connected to redis");
    Ok(conn)
}
