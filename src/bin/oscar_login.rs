use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use oscar::config::ClientConfig;
use oscar::login::{self, LoginPath, LoginResult};
use oscar::network::{read_flap, write_pending};
use oscar::snac::auth;
use oscar::snac::callbacks::{special, Event};
use oscar::{ConnKind, Dispatcher, Session};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut conf_file = "conf/client.yaml".to_string();

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "--h" | "--?" | "/?" => {
                println!("Usage: oscar_login [--conf FILE]");
                return Ok(());
            }
            "--conf" => {
                if i + 1 < args.len() {
                    i += 1;
                    conf_file = args[i].clone();
                } else {
                    eprintln!("Error: --conf requires a FILE argument");
                    return Ok(());
                }
            }
            _ => {}
        }
        i += 1;
    }

    let config = ClientConfig::from_file(&conf_file)
        .with_context(|| format!("Cannot load config: {}", conf_file))?;

    match run(&config).await? {
        LoginResult::Success(ok) => {
            let (host, port) = ok.bos_address(config.auth_port);
            println!("Authenticated as {}", ok.screen_name);
            println!("BOS server: {}:{}", host, port);
            if let Some(email) = &ok.email {
                println!("Email: {}", email);
            }
            Ok(())
        }
        LoginResult::Failure { code, url, .. } => {
            bail!(
                "Login failed: code 0x{:04x}{}",
                code,
                url.map(|u| format!(" ({})", u)).unwrap_or_default()
            )
        }
    }
}

/// Drives one authorizer login to completion.
async fn run(config: &ClientConfig) -> Result<LoginResult> {
    let frame_timeout = Duration::from_secs(config.frame_timeout_secs.max(1));
    let addr = config.auth_addr();

    let stream = tokio::time::timeout(frame_timeout, TcpStream::connect(&addr))
        .await
        .with_context(|| format!("Timed out connecting to {}", addr))?
        .with_context(|| format!("Cannot connect to {}", addr))?;
    tracing::info!("[login] [connected] addr={addr}");
    let (mut reader, mut writer) = stream.into_split();

    // frames arrive through a channel so keepalives never cut a read short
    let (tx, mut rx) = mpsc::channel(16);
    tokio::spawn(async move {
        loop {
            let frame = read_flap(&mut reader).await;
            let failed = frame.is_err();
            if tx.send(frame).await.is_err() || failed {
                break;
            }
        }
    });

    let mut session = Session::new(config.screen_name.clone());
    let auth_conn = session.open_conn(ConnKind::Authorizer);
    session.conn_mut(auth_conn)?.set_max_payload(config.max_payload);

    let mut dispatcher = Dispatcher::new();
    let password = config.password.clone();
    let info = config.client_info.clone();
    dispatcher
        .callbacks()
        .register(auth::FAMILY, auth::SUBTYPE_KEY, move |session, conn, _| {
            login::send_login(session, conn, &password, &info)
        });
    dispatcher.callbacks().register(
        special::FAMILY,
        special::CONNECTION_ERROR,
        |_, conn, ev| {
            if let Event::ConnectionError { code, message } = ev {
                tracing::warn!(
                    "[login] [disconnect] conn={conn} code=0x{code:04x} msg={}",
                    message.as_deref().unwrap_or("")
                );
            }
            Ok(())
        },
    );

    if login::request_login(&mut session, auth_conn, &config.screen_name)? == LoginPath::Xor {
        login::send_login(&mut session, auth_conn, &config.password, &config.client_info)?;
    }

    let mut keepalive = tokio::time::interval(Duration::from_secs(config.keepalive_secs.max(1)));
    keepalive.tick().await;

    loop {
        write_pending(session.conn_mut(auth_conn)?, &mut writer).await?;
        if let Some(result) = session.login.result() {
            return Ok(result.clone());
        }

        tokio::select! {
            msg = tokio::time::timeout(frame_timeout, rx.recv()) => {
                let frame = match msg {
                    Err(_) => bail!("No frame from authorizer within {:?}", frame_timeout),
                    Ok(None) => bail!("Authorizer reader stopped"),
                    Ok(Some(frame)) => frame.context("Cannot read frame from authorizer")?,
                };
                let frame = match session.conn_mut(auth_conn)?.accept(frame) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!("[login] [frame_dropped] err={e}");
                        continue;
                    }
                };
                if let Err(e) = dispatcher.dispatch_frame(&mut session, auth_conn, &frame) {
                    if e.is_fatal_to_connection() {
                        return Err(e).context("Authorizer connection failed");
                    }
                    tracing::warn!("[login] [frame_rejected] err={e}");
                }
            }
            _ = keepalive.tick(), if config.keepalive_secs > 0 => {
                session.conn_mut(auth_conn)?.send_keepalive()?;
            }
        }
    }
}
