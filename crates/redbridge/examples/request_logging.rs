use redbridge::prelude::*;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // DEBUG shows one event per Redis command
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    let storage = RedisStorage::new(MemoryDriver::new());
    storage.use_configuration(BackendId::default(), RedisConfiguration::default())?;
    let cache = storage.cache();

    // each request gets its own span; commands issued for it are nested inside
    for user in ["alice", "bob"] {
        let request = storage.request();
        let scoped = cache.for_request(&request);
        scoped.set(&format!("user:{user}"), Some(user)).await?;
        let value = scoped.get::<String>(&format!("user:{user}")).await?;
        println!("request {} -> {:?}", request.id(), value);
    }

    // callback style
    let (tx, rx) = tokio::sync::oneshot::channel();
    cache.submit(
        |c| async move { c.get::<String>("user:alice").await },
        move |result| {
            let _ = tx.send(result);
        },
    );
    println!("callback -> {:?}", rx.await);

    Ok(())
}
