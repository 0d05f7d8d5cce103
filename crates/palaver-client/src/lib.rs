pub mod commands;
pub mod composer;
pub mod config;
pub mod conversations;
pub mod error;
pub mod messages;
pub mod presence;
pub mod receipts;
pub mod session;
pub mod typing;
pub mod views;

use tracing_subscriber::{fmt, EnvFilter};

pub use composer::Composer;
pub use config::ClientConfig;
pub use conversations::{ConversationList, ConversationRow};
pub use error::{ClientError, Result};
pub use messages::{MessageBody, MessageRow, MessageStream, StreamUpdate, Viewport};
pub use receipts::DeliveryStatus;
pub use session::Session;
pub use views::{ConversationUpdate, ConversationView, InboxView};

/// Install the global tracing subscriber.  `RUST_LOG` overrides the default
/// filter.  Calling this more than once is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("palaver_client=debug,palaver_store=info,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();

    tracing::info!("Tracing initialised");
}
