//! # palaver-demo
//!
//! Runs two signed-in clients against one in-process backend and plays a
//! short conversation: first contact, unread badge, read receipt, edit and
//! delete-for-everyone.  Every step is logged; set `RUST_LOG` for more.

use anyhow::Context;
use palaver_client::commands::conversations::ensure_dm;
use palaver_client::{init_tracing, ClientConfig, ConversationView, Session};
use palaver_store::{spawn_store, AuthServer, StoreConfig};
use tracing::info;

async fn settle(
    view: &mut ConversationView,
    done: impl Fn(&ConversationView) -> bool,
) -> anyhow::Result<()> {
    while !done(view) {
        view.next().await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Tracing and configuration
    // -----------------------------------------------------------------------
    init_tracing();
    info!("Starting palaver demo v{}", env!("CARGO_PKG_VERSION"));

    let store_config = StoreConfig::from_env();
    let client_config = ClientConfig::from_env();
    info!(?store_config, ?client_config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 2. Backend and two clients
    // -----------------------------------------------------------------------
    let store = spawn_store(store_config.clone());
    let accounts = AuthServer::new(store_config);

    let alice = Session::sign_up(
        store.clone(),
        accounts.client(),
        client_config.clone(),
        "alice@example.com",
        "correct-horse",
        "Alice",
    )
    .await
    .context("alice sign-up")?;
    let bob = Session::sign_up(
        store.clone(),
        accounts.client(),
        client_config,
        "bob@example.com",
        "battery-staple",
        "Bob",
    )
    .await
    .context("bob sign-up")?;

    // -----------------------------------------------------------------------
    // 3. Conversation
    // -----------------------------------------------------------------------
    let me = alice.profile().await?.context("alice profile missing")?;
    let other = bob.profile().await?.context("bob profile missing")?;
    let chat = ensure_dm(alice.store(), &me, &other).await?;

    let mut alice_view = alice.open_conversation(&chat).await?;
    let mut composer = alice.composer(chat.clone());
    composer.input("Hi Bob, lunch today?").await;
    let sent = composer.send(alice_view.conversation()).await?;
    info!(message = %sent, "Alice sent a message");

    let mut inbox = bob.inbox().await?;
    if let Some(rows) = inbox.next().await? {
        for row in &rows {
            info!(title = %row.title, preview = %row.preview_text(), unread = ?row.unread_badge, "Bob's inbox");
        }
    }

    let mut bob_view = bob.open_conversation(&chat).await?;
    settle(&mut bob_view, |v| v.stream().is_loaded()).await?;
    info!(status = %bob_view.header_status(), "Bob opened the chat");

    settle(&mut alice_view, |v| {
        v.rows().last().and_then(|r| r.status) == Some(palaver_client::DeliveryStatus::Read)
    })
    .await?;
    info!("Alice sees her message as read");

    let message = alice_view
        .stream()
        .find(&sent)
        .cloned()
        .context("sent message not in view")?;
    composer.begin_edit(&message)?;
    composer.set_edit_text("Hi Bob, lunch tomorrow?");
    composer.save_edit(alice_view.conversation()).await?;
    settle(&mut alice_view, |v| {
        v.stream().find(&sent).is_some_and(|m| m.is_edited())
    })
    .await?;

    let edited = alice_view.stream().find(&sent).cloned().context("message vanished")?;
    let conversation = alice_view.conversation().clone();
    composer.delete_for_everyone(&conversation, &edited).await?;
    settle(&mut bob_view, |v| {
        v.rows().first().is_some_and(|r| r.body == palaver_client::MessageBody::Deleted)
    })
    .await?;
    info!(preview = %bob_view.rows()[0].body.display_text(), "Bob sees the tombstone");

    // -----------------------------------------------------------------------
    // 4. Shutdown
    // -----------------------------------------------------------------------
    inbox.close().await;
    bob_view.close().await;
    alice_view.close().await;
    bob.sign_out().await;
    alice.sign_out().await;
    store.shutdown().await;

    info!("Demo finished");
    Ok(())
}
