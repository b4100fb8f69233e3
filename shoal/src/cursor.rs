//! Single-reply command cursor
//!
//! Commands never iterate batches: the query asks for one reply
//! (`number_to_return = -1`) and the first document of that reply is the
//! result.

use crate::connection::QueryMessage;
use crate::dispatcher::CommandDispatcher;
use crate::document::{CommandDocument, Document};
use crate::error::Result;
use crate::node::Node;
use tracing::warn;

pub struct Cursor {
    message: QueryMessage,
}

impl Cursor {
    /// Cursor over `"{db}.$cmd"` for a finalized command
    pub fn command(db_name: &str, command: CommandDocument) -> Self {
        Self {
            message: QueryMessage::command(db_name, command),
        }
    }

    pub fn message(&self) -> &QueryMessage {
        &self.message
    }

    /// Send the query to `node` and read exactly one reply.
    ///
    /// The connection goes back to the pool unless reading failed with a
    /// network error, in which case it is evicted.
    pub async fn find_one(&self, dispatcher: &CommandDispatcher, node: &Node) -> Result<Document> {
        let mut connection = dispatcher.send(&self.message, node).await?;

        match connection.receive().await {
            Ok(reply) => {
                node.pool().release(connection).await;
                reply.first_document()
            }
            Err(e) if !e.is_network_error() => {
                node.pool().release(connection).await;
                Err(e)
            }
            Err(e) => {
                warn!(address = %node.address(), error = %e, "Reading reply failed, evicting connection");
                node.pool().evict(connection).await;
                Err(e)
            }
        }
    }
}
