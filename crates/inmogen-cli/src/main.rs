use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use inmogen_contracts::content::GeneratedListing;
use inmogen_contracts::credentials::CredentialStore;
use inmogen_contracts::events::EventWriter;
use inmogen_engine::{EntryOutcome, HttpListingService, SessionController};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "inmogen", version, about = "InmoGen property listing studio")]
struct Cli {
    /// Directory holding the stored credential and the session event log.
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,
    /// Base URL of the InmoGen API.
    #[arg(long, global = true)]
    api_base: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log in and store the session token.
    Login(LoginArgs),
    /// Create a new account.
    Register(RegisterArgs),
    /// Generate listing copy for a property.
    Generate(GenerateArgs),
    /// List previously generated listings, newest first.
    History,
    /// Show one previously generated listing.
    Show(ShowArgs),
    /// Clear the stored session token.
    Logout,
}

#[derive(Debug, Parser)]
struct LoginArgs {
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
}

#[derive(Debug, Parser)]
struct RegisterArgs {
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
    #[arg(long)]
    full_name: String,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    address: String,
    #[arg(long)]
    features: String,
    #[arg(long)]
    vibe: String,
    /// Property photo to attach; repeat the flag for multiple images.
    #[arg(long = "image")]
    images: Vec<PathBuf>,
}

#[derive(Debug, Parser)]
struct ShowArgs {
    #[arg(long)]
    id: i64,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("inmogen error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let state_dir = resolve_state_dir(cli.state_dir.clone());
    let service = match cli.api_base.clone() {
        Some(base) => HttpListingService::with_base(base),
        None => HttpListingService::new(),
    };

    match cli.command {
        Command::Login(args) => run_login(&service, &state_dir, args),
        Command::Register(args) => run_register(&service, args),
        Command::Generate(args) => run_generate(service, &state_dir, args),
        Command::History => run_history(service, &state_dir),
        Command::Show(args) => run_show(service, &state_dir, args),
        Command::Logout => run_logout(service, &state_dir),
    }
}

fn run_login(service: &HttpListingService, state_dir: &Path, args: LoginArgs) -> Result<i32> {
    let token = service.login(&args.email, &args.password)?;
    CredentialStore::new(state_dir.join("credentials.json")).set(&token)?;
    println!("logged in as {}", args.email);
    Ok(0)
}

fn run_register(service: &HttpListingService, args: RegisterArgs) -> Result<i32> {
    service.register(&args.email, &args.password, &args.full_name)?;
    println!("account created; run `inmogen login` next");
    Ok(0)
}

fn run_generate(
    service: HttpListingService,
    state_dir: &Path,
    args: GenerateArgs,
) -> Result<i32> {
    let mut session = open_session(service, state_dir);
    if session.start()? == EntryOutcome::RedirectToLogin {
        eprintln!("not logged in; run `inmogen login` first");
        return Ok(2);
    }

    let mut files = Vec::new();
    for path in &args.images {
        let bytes =
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        if image::guess_format(&bytes).is_err() {
            bail!("{} does not look like an image", path.display());
        }
        files.push((file_name_for(path), bytes));
    }
    session.attach(files);

    let form = session.form_mut();
    form.address = args.address;
    form.features = args.features;
    form.vibe = args.vibe;

    match session.submit() {
        Ok(listing) => {
            render_listing(&listing);
            Ok(0)
        }
        Err(err) if err.is_authorization_denied() => {
            eprintln!("session expired; log in again");
            Ok(2)
        }
        Err(err) => Err(err.into()),
    }
}

fn run_history(service: HttpListingService, state_dir: &Path) -> Result<i32> {
    let mut session = open_session(service, state_dir);
    if session.start()? == EntryOutcome::RedirectToLogin {
        eprintln!("not logged in; run `inmogen login` first");
        return Ok(2);
    }

    if session.history().is_empty() {
        println!("no listings generated yet");
        return Ok(0);
    }
    for listing in session.history().records() {
        let vibe = if listing.vibe.is_empty() {
            "General"
        } else {
            listing.vibe.as_str()
        };
        println!("{:>6}  {}  ({vibe})", listing.id, listing.address);
    }
    Ok(0)
}

fn run_show(service: HttpListingService, state_dir: &Path, args: ShowArgs) -> Result<i32> {
    let mut session = open_session(service, state_dir);
    if session.start()? == EntryOutcome::RedirectToLogin {
        eprintln!("not logged in; run `inmogen login` first");
        return Ok(2);
    }

    if !session.load_existing(args.id)? {
        eprintln!("no listing with id {}", args.id);
        return Ok(1);
    }
    if let Some(listing) = session.selected() {
        render_listing(listing);
    }
    Ok(0)
}

fn run_logout(service: HttpListingService, state_dir: &Path) -> Result<i32> {
    let mut session = open_session(service, state_dir);
    session.logout()?;
    println!("logged out");
    Ok(0)
}

fn open_session(
    service: HttpListingService,
    state_dir: &Path,
) -> SessionController<HttpListingService> {
    let credentials = CredentialStore::new(state_dir.join("credentials.json"));
    let events = EventWriter::new(
        state_dir.join("events.jsonl"),
        Uuid::new_v4().to_string(),
    );
    SessionController::new(service, credentials, events)
}

fn render_listing(listing: &GeneratedListing) {
    println!("{}", listing.copy.title);
    if !listing.copy.highlights.is_empty() {
        println!("[{}]", listing.copy.highlights.join(" · "));
    }
    if !listing.copy.short_description.is_empty() {
        println!();
        println!("{}", listing.copy.short_description);
    }
    if !listing.copy.full_description.is_empty() {
        println!();
        println!("{}", listing.copy.full_description);
    }
    if !listing.copy.instagram_copy.is_empty() {
        println!();
        println!("instagram: {}", listing.copy.instagram_copy);
    }
}

fn resolve_state_dir(flag: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = flag {
        return dir;
    }
    env::var("INMOGEN_STATE_DIR")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".inmogen"))
}

fn file_name_for(path: &Path) -> String {
    path.file_name()
        .and_then(|value| value.to_str())
        .unwrap_or("image")
        .to_string()
}
