use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use mmedia_library::catalog::LoadOptions;
use mmedia_library::fetch::HttpFetcher;
use mmedia_library::service::{ChildrenReply, MediaService};
use mmedia_proto::config::Config;
use mmedia_session::dispatcher::SelectionDispatcher;
use mmedia_session::engine::{NullEngine, PlaybackEngine, RemoteEngine};
use mmedia_session::http::{self, HttpState};
use mmedia_session::session::SessionConnection;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Setup file logging
    let data_dir = mmedia_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;
    let log_path = data_dir.join("mmedia.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(
                    "info,mmedia_library=debug,mmedia_session=debug,hyper_util=warn,reqwest=warn",
                )
            }),
        )
        .init();

    eprintln!("Logging to {}", log_path.display());
    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let fetcher = HttpFetcher::new(Duration::from_secs(config.catalog.request_timeout_secs))
        .context("building HTTP client")?;
    let service = MediaService::start(
        config.catalog.url.clone(),
        Arc::new(fetcher),
        LoadOptions::from(&config.catalog),
    );

    let (engine, events) = if config.engine.enabled {
        match RemoteEngine::connect(&config.engine.address).await {
            Ok((engine, events)) => (engine as Arc<dyn PlaybackEngine>, events),
            Err(e) => {
                warn!("Playback engine at {} unavailable: {}", config.engine.address, e);
                let (engine, events) = NullEngine::new();
                (engine as Arc<dyn PlaybackEngine>, events)
            }
        }
    } else {
        let (engine, events) = NullEngine::new();
        (engine as Arc<dyn PlaybackEngine>, events)
    };

    let session = SessionConnection::connect(Arc::clone(&service), engine, events);
    print_tree(&session).await;

    if config.http.enabled {
        let state = HttpState {
            session: Arc::clone(&session),
            dispatcher: Arc::new(SelectionDispatcher::new(Arc::clone(&session))),
        };
        let handle = http::start_server(config.http.bind_address.clone(), config.http.port, state);
        handle.await.context("HTTP server task failed")?;
    }

    session.close();
    Ok(())
}

/// Print albums with their tracks once the catalog is ready.
async fn print_tree(session: &SessionConnection) {
    let root = session.service().root();
    let albums = match session.children(root).wait().await {
        ChildrenReply::Children(albums) => albums,
        other => {
            println!("Catalog unavailable ({:?})", other);
            return;
        }
    };

    if let Some(report) = session.service().report() {
        println!(
            "{} tracks in {} albums ({} skipped, {} without artwork)",
            report.tracks,
            albums.len(),
            report.skipped,
            report.artwork_fallbacks
        );
        if let Some(error) = report.document_error {
            println!("Catalog document unavailable: {}", error);
        }
    }

    for album in albums {
        println!("{} - {}", album.title, album.subtitle);
        if let ChildrenReply::Children(tracks) = session.children(&album.id).wait().await {
            for track in tracks {
                println!("    {}  [{}]", track.title, track.id);
            }
        }
    }
}
