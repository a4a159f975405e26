use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use uuid::Uuid;

use crate::error::AppResult;

/// Pub/sub transport that fans realtime change events out across server instances.
#[derive(Clone)]
pub struct RedisClient {
    client: Client,
    conn: MultiplexedConnection,
}

pub fn change_channel(user_id: Uuid) -> String {
    format!("changes:{}", user_id)
}

impl RedisClient {
    pub async fn new(url: &str) -> AppResult<Self> {
        let client = Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { client, conn })
    }

    pub async fn ping(&self) -> AppResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }

    pub async fn publish_change(&self, user_id: Uuid, payload: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(change_channel(user_id), payload).await?;
        Ok(())
    }

    pub async fn subscribe_changes(&self, user_id: Uuid) -> AppResult<redis::aio::PubSub> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(change_channel(user_id)).await?;
        Ok(pubsub)
    }
}
