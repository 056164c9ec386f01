use {
    anyhow::{anyhow, Context, Result},
    clap::Parser,
    futures_lite::{io::AsyncWriteExt, StreamExt},
    smol::{fs, Unblock},
    std::{io, os::unix::fs::MetadataExt, path::PathBuf, process::ExitCode},
    tarstream::{Content, EntryDescriptor, Tarball},
    tracing_subscriber::fmt,
};

/// Write regular files into a ustar archive, using PAX headers for long
/// paths and large files.
#[derive(Parser, Debug)]
#[command(name = "tarstream", version)]
struct App {
    /// Target file name (stdout when omitted)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    out: Option<PathBuf>,
    /// Modification time for every entry, in seconds since the epoch
    #[arg(long = "mtime", value_name = "SECONDS")]
    mtime: Option<u64>,
    /// Permission bits for every entry, in octal
    #[arg(long = "mode", value_name = "OCTAL", value_parser = parse_mode)]
    mode: Option<u32>,
    /// Owner name recorded for every entry
    #[arg(long = "owner", value_name = "NAME")]
    owner: Option<String>,
    /// Group name recorded for every entry
    #[arg(long = "group", value_name = "NAME")]
    group: Option<String>,
    /// Files to archive
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,
}

fn parse_mode(s: &str) -> std::result::Result<u32, String> {
    u32::from_str_radix(s, 8).map_err(|err| format!("invalid octal mode {:?}: {}", s, err))
}

fn entry_name(path: &std::path::Path) -> Result<String> {
    let name = path
        .to_str()
        .ok_or_else(|| anyhow!("{}: file name is not valid UTF-8", path.display()))?;
    Ok(name.trim_start_matches('/').to_string())
}

async fn describe(app: &App, path: &PathBuf) -> Result<EntryDescriptor<'static>> {
    let meta = fs::metadata(path)
        .await
        .with_context(|| format!("{}: failed to stat", path.display()))?;
    if meta.is_dir() {
        return Err(anyhow!("{}: directories are not supported", path.display()));
    }
    let source = path.clone();
    let content = Content::open_with(move || async move {
        fs::File::open(&source).await.map_err(|err| {
            io::Error::new(
                err.kind(),
                format!("{}: failed to open: {}", source.display(), err),
            )
        })
    });
    let mut entry = EntryDescriptor::new(entry_name(path)?)
        .with_mode(app.mode.unwrap_or(meta.mode() & 0o7777))
        .with_uid(meta.uid())
        .with_gid(meta.gid())
        .with_size(meta.len())
        .with_content(content);
    entry = match app.mtime {
        Some(mtime) => entry.with_mtime(mtime),
        None => entry.with_modified(meta.modified()?),
    };
    if let Some(owner) = &app.owner {
        entry = entry.with_uname(owner.as_str());
    }
    if let Some(group) = &app.group {
        entry = entry.with_gname(group.as_str());
    }
    tracing::debug!(target: "tarstream", "entry: {:?}", &entry);
    Ok(entry)
}

async fn run(app: App) -> Result<()> {
    let mut entries = Vec::with_capacity(app.files.len());
    for path in app.files.iter() {
        entries.push(describe(&app, path).await?);
    }
    let mut tarball = Tarball::new(entries)?;
    let mut out: Box<dyn futures_lite::io::AsyncWrite + Unpin> = match &app.out {
        Some(path) => Box::new(
            fs::File::create(path)
                .await
                .with_context(|| format!("{}: failed to create", path.display()))?,
        ),
        None => Box::new(Unblock::new(std::io::stdout())),
    };
    let mut written = 0u64;
    while let Some(chunk) = tarball.next().await {
        let chunk = chunk?;
        out.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    out.flush().await?;
    out.close().await?;
    tracing::debug!(target: "tarstream", "wrote {} bytes", written);
    Ok(())
}

fn main() -> ExitCode {
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::WARN.into())
        .from_env_lossy();

    let base_format = fmt::format()
        .without_time()
        .with_level(true)
        .with_target(true);

    if let Err(err) = fmt()
        .with_env_filter(filter)
        .event_format(base_format)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("failed to initialize logging: {}", err);
    }

    let app = App::parse();
    match smol::block_on(run(app)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("tarstream: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
