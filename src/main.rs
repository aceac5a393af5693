use tokio::net::TcpListener;
use tokio::select;
use tokio_util::sync::CancellationToken;

use sstpd_rust::config::get_config;
use sstpd_rust::handshake::serve_connection;
use sstpd_rust::log::log_line;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = get_config()?;
    let listener = TcpListener::bind(&config.listen).await?;
    log_line(&format!("Listening on {}", config.listen));

    let root_cancel = CancellationToken::new();
    let ctrl_c_cancel = root_cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log_line("Shutting down");
            ctrl_c_cancel.cancel();
        }
    });

    loop {
        let accepted = select! {
            _ = root_cancel.cancelled() => break,
            a = listener.accept() => a,
        };
        match accepted {
            Ok((stream, peer)) => {
                log_line(&format!("Accepted connection from {peer}"));
                let session_config = config.session.clone();
                let cancel = root_cancel.child_token();
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(stream, session_config, cancel).await {
                        log_line(&format!("Connection {peer} failed: {e:#}"));
                    }
                });
            }
            Err(e) => log_line(&format!("Accept failed: {e}")),
        }
    }

    Ok(())
}
