use redbridge::prelude::*;
use std::time::Duration;

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Session {
    user: String,
    roles: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let storage = RedisStorage::new(MemoryDriver::new());
    storage.use_configuration(BackendId::default(), RedisConfiguration::default())?;
    storage.use_configuration("sessions", RedisConfiguration::default().database(1))?;

    // JSON cache on the default backend
    let cache = storage.cache();
    cache.set("greeting", Some("hello")).await?;
    println!("greeting = {:?}", cache.get::<String>("greeting").await?);

    // MessagePack cache on a second backend, entries expire after a minute
    let sessions = storage.cache_with("sessions", MsgPackEncoder, MsgPackDecoder);
    let session = Session {
        user: "alice".to_string(),
        roles: vec!["admin".to_string()],
    };
    sessions
        .set_with_expiry("session:1", Some(&session), Some(Duration::from_secs(60)))
        .await?;
    println!("session = {:?}", sessions.get::<Session>("session:1").await?);
    println!(
        "ttl = {:?}",
        storage.redis("sessions").ttl("session:1").await?
    );

    // the backends are separate databases
    println!(
        "greeting on sessions backend = {:?}",
        storage.redis("sessions").get_string("greeting").await?
    );

    // setting None deletes
    cache.set::<str>("greeting", None).await?;
    println!("after delete = {:?}", cache.get::<String>("greeting").await?);

    Ok(())
}
