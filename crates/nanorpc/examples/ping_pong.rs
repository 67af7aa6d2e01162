//! Minimal client/server round trip: a server registers an echo handler at
//! `/echo`, a client dials in over TCP, pings it, then sends one REQUEST and
//! prints the echoed payload.
//!
//! Run with: `cargo run -p nanorpc --example ping_pong`

use std::sync::Arc;
use std::time::Duration;

use nanorpc::prelude::*;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let hash_cache = HashCache::new();
    let handler = Arc::new(MessageHandler::new(hash_cache.clone()));
    handler.register_handler(
        "/echo",
        handler_fn(|ctx: RequestContext| async move {
            let data = ctx.data().to_vec();
            if let Err(e) = ctx.send_ok(data).await {
                tracing::warn!(error = %e, "failed to reply to /echo");
            }
        }),
    )?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let manager = SessionManager::new();
    let shutdown = CancellationToken::new();

    tokio::spawn(serve(
        listener,
        Arc::clone(&manager),
        Arc::clone(&handler),
        ServerSessionTimeouts::default(),
        shutdown.clone(),
    ));

    let transport = TcpReconnectTransport::new(addr.to_string())?;
    let supervisor = ClientSupervisor::new(
        transport,
        ClientSupervisorConfig::default(),
        ClientHooks::default(),
    );
    supervisor.start();

    // Give the reconnect loop a moment to dial and attach the first session.
    tokio::time::sleep(Duration::from_millis(100)).await;

    println!("ping: {}", supervisor.ping().await);

    let rx = supervisor.pong().await;
    println!("pong: {:?}", rx.await?);

    let (tx, rx) = tokio::sync::oneshot::channel();
    let tx = std::sync::Mutex::new(Some(tx));
    supervisor
        .request(
            "/echo",
            b"hello from the client".to_vec(),
            Box::new(move |resp| {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(resp);
                }
            }),
        )
        .await?;
    let resp = rx.await?;
    println!("echo response: {resp:?}");

    shutdown.cancel();
    Ok(())
}
