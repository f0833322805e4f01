use redbridge::prelude::*;
use std::time::Duration;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // REDIS_URL, or REDIS_HOSTNAME / REDIS_PORT, or 127.0.0.1:6379
    let configuration = RedisConfiguration::from_env()?
        .pool(PoolOptions::default().maximum_connections(4));
    println!("Connecting to Redis at {}", configuration.address());

    let storage = RedisStorage::new(RedisDriver);
    storage.use_configuration(BackendId::default(), configuration)?;
    let redis = storage.redis_default();

    if let Err(e) = redis.ping().await {
        eprintln!("Failed to connect to Redis: {}", e);
        println!("Make sure Redis is running at 127.0.0.1:6379 or set REDIS_URL");
        return Ok(());
    }

    let cache = storage.cache();
    cache
        .set_with_expiry("hello", Some("world"), Some(Duration::from_secs(300)))
        .await?;
    println!("hello = {:?}", cache.get::<String>("hello").await?);
    println!("ttl = {:?}", redis.ttl("hello").await?);

    // MULTI/EXEC needs every command on one connection
    let counters = redis
        .with_borrowed_connection(|conn| async move {
            conn.send("MULTI", Vec::new()).await?;
            conn.send("INCR", redbridge::args(["example:counter"])).await?;
            conn.send("INCR", redbridge::args(["example:counter"])).await?;
            conn.send("EXEC", Vec::new()).await
        })
        .await?;
    println!("counters = {:?}", counters);

    // pub/sub on the dedicated subscription connection
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    redis
        .subscribe(
            ["example:events"],
            SubscriptionHandlers::new(move |message| {
                let _ = tx.send(message);
            }),
        )
        .await?;
    redis.publish("example:events", b"ping").await?;
    if let Some(message) = rx.recv().await {
        println!("received {:?} on {}", message.payload_str(), message.channel);
    }

    redis.delete(&["hello", "example:counter"]).await?;
    storage.shutdown();
    Ok(())
}
