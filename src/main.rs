use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use linkorg::cache::{AssetGateway, AssetRequest};
use linkorg::store::{detect, LinkStore};
use linkorg::types::{Link, LinkId};
use linkorg::{Config, LinkDraft};

#[derive(Parser, Debug)]
#[command(name = "linkorg")]
#[command(about = "Offline-first bookmark organizer")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/linkorg/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Also write logs to this file
  #[arg(long)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List every stored link
  List,
  /// Filter stored links by title
  Search { term: String },
  /// Store a new link
  Add {
    #[arg(long)]
    title: String,
    #[arg(long)]
    url: String,
    #[arg(long = "tag")]
    tags: Vec<String>,
  },
  /// Replace fields of a stored link
  Edit {
    id: LinkId,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    url: Option<String>,
    /// Replace the whole tag set
    #[arg(long = "tag")]
    tags: Vec<String>,
  },
  /// Remove a stored link
  Delete { id: LinkId },
  /// Move a link to a new index in the manual ordering
  Move { id: LinkId, index: usize },
  /// Asset cache operations
  Cache {
    #[command(subcommand)]
    command: CacheCommand,
  },
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
  /// Precache the asset manifest into the current bucket
  Install,
  /// Sweep stale bucket versions
  Activate,
  /// Resolve one request through the cache
  Fetch {
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
  },
  /// Show the current bucket's tag, size, and freshness
  Status,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_tracing(args.log_file.as_deref());

  let config = Config::load(args.config.as_deref())?;

  match args.command {
    Command::List => {
      let store = open_store(&config).await?;
      print_links(&store.links());
    }
    Command::Search { term } => {
      let store = open_store(&config).await?;
      print_links(&store.search(&term));
    }
    Command::Add { title, url, tags } => {
      let store = open_store(&config).await?;
      let link = store.add(LinkDraft::new(title, url).with_tags(tags)).await?;
      println!("Added {} ({})", link.id, link.title);
    }
    Command::Edit {
      id,
      title,
      url,
      tags,
    } => {
      let store = open_store(&config).await?;
      let mut link = store
        .links()
        .into_iter()
        .find(|l| l.id == id)
        .ok_or_else(|| eyre!("No link with id {}", id))?;

      if let Some(title) = title {
        link.title = title;
      }
      if let Some(url) = url {
        link.url = url;
      }
      if !tags.is_empty() {
        link.tags = tags.into_iter().collect();
      }

      store.edit(&link).await?;
      println!("Edited {}", id);
    }
    Command::Delete { id } => {
      let store = open_store(&config).await?;
      store.delete(id).await?;
      println!("Deleted {}", id);
    }
    Command::Move { id, index } => {
      let store = open_store(&config).await?;
      let current = ordered(store.links());

      let from = current
        .iter()
        .position(|l| l.id == id)
        .ok_or_else(|| eyre!("No link with id {}", id))?;
      if index >= current.len() {
        return Err(eyre!("Index {} is out of range", index));
      }

      let mut proposed = current.clone();
      let link = proposed.remove(from);
      proposed.insert(index, link);

      match detect(&current, &proposed) {
        Some(plan) => {
          let written = plan.commit(&store).await?;
          println!("Reordered {} links", written);
        }
        None => println!("No change"),
      }
    }
    Command::Cache { command } => {
      let gateway = AssetGateway::new(&config)?;
      match command {
        CacheCommand::Install => {
          gateway.install().await?;
          println!("Installed bucket {}", gateway.bucket());
        }
        CacheCommand::Activate => {
          gateway.activate(None).await?;
          println!("Activated bucket {}", gateway.bucket());
        }
        CacheCommand::Fetch { url, method } => {
          let response = gateway.handle(&AssetRequest::new(&method, &url), None).await;
          println!("{} {}", response.status, url);
          io::Write::write_all(&mut io::stdout(), &response.body)?;
        }
        CacheCommand::Status => {
          println!("bucket: {}", gateway.bucket());
          println!("entries: {}", gateway.bucket_len()?);
          match gateway.bucket_newest()? {
            Some(newest) => println!("newest: {}", newest.format("%Y-%m-%d %H:%M:%S UTC")),
            None => println!("newest: -"),
          }
        }
      }
    }
  }

  Ok(())
}

async fn open_store(config: &Config) -> Result<LinkStore> {
  let store = LinkStore::open(config).await?;
  // Surface a failed initial load instead of printing an empty list
  if let Some(e) = store.error() {
    return Err(eyre!(e));
  }
  Ok(store)
}

/// Projection in manual order: explicit positions first, then insertion
/// order for records never reordered.
fn ordered(mut links: Vec<Link>) -> Vec<Link> {
  links.sort_by_key(|l| (l.position.is_none(), l.position, l.id));
  links
}

fn print_links(links: &[Link]) {
  for link in ordered(links.to_vec()) {
    let tags = if link.tags.is_empty() {
      String::new()
    } else {
      format!(
        "  [{}]",
        link.tags.iter().cloned().collect::<Vec<_>>().join(", ")
      )
    };
    println!("{:>4}  {}  {}{}", link.id, link.title, link.url, tags);
  }
}

fn init_tracing(log_file: Option<&std::path::Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
  // RUST_LOG controls verbosity (e.g. RUST_LOG=linkorg=debug)
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
  let stderr_layer = fmt::layer().with_writer(io::stderr);

  match log_file {
    Some(path) => {
      let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
      let file = path.file_name().map(PathBuf::from).unwrap_or_else(|| "linkorg.log".into());
      let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file));

      tracing_subscriber::registry()
        .with(stderr_layer)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();
      Some(guard)
    }
    None => {
      tracing_subscriber::registry()
        .with(stderr_layer)
        .with(filter)
        .init();
      None
    }
  }
}
