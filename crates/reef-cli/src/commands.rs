use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use reef_crypto::{Identity, PublicKey};
use reef_envelope::header::CONTENT_TYPE;
use reef_envelope::{seal_with, CipherMessage, EnvelopeError, Header, Message, SealOptions};
use reef_store::{BlobStore, OsStorehouse, Storehouser};
use reef_types::Id;
use tracing::debug;

use crate::cli::*;
use crate::config::IdentityConfig;
use crate::settings::Settings;

pub fn run_command(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.settings.as_deref())?;
    debug!(?settings, "loaded settings");
    match cli.command {
        Command::Identity(args) => match args.action {
            IdentityAction::Generate(file) => cmd_identity_generate(&file),
            IdentityAction::Show(file) => cmd_identity_show(&file),
        },
        Command::Seal(args) => cmd_seal(args, &settings),
        Command::Open(args) => cmd_open(args, &settings),
        Command::Store(args) => cmd_store(args.action, &settings),
    }
}

fn load_identity(file: &IdentityFile) -> Result<Identity> {
    Ok(IdentityConfig::load(&file.identity, &file.password)?.identity)
}

fn parse_key(text: &str) -> Result<PublicKey> {
    PublicKey::from_text(text).with_context(|| format!("invalid public key {text:?}"))
}

fn parse_id(text: &str) -> Result<Id> {
    text.parse().with_context(|| format!("invalid blob id {text:?}"))
}

fn open_storehouse(settings: &Settings) -> Result<OsStorehouse> {
    OsStorehouse::open(&settings.store_root)
        .with_context(|| format!("failed to open storehouse {}", settings.store_root.display()))
}

fn output_writer(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    })
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

fn cmd_identity_generate(file: &IdentityFile) -> Result<()> {
    let identity = Identity::generate();
    IdentityConfig::new(identity.clone()).save(&file.identity, &file.password)?;
    println!(
        "{} Generated identity in {}",
        "✓".green().bold(),
        file.identity.display().to_string().bold()
    );
    println!("  Public key: {}", identity.public_key().to_string().cyan());
    Ok(())
}

fn cmd_identity_show(file: &IdentityFile) -> Result<()> {
    let identity = load_identity(file)?;
    println!("{}", identity.public_key());
    Ok(())
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

fn cmd_seal(args: SealArgs, settings: &Settings) -> Result<()> {
    let from = load_identity(&args.from)?;
    let to = parse_key(&args.to)?;
    let input = File::open(&args.input)
        .with_context(|| format!("failed to open {}", args.input.display()))?;
    let message = Message::new(Header::new().with(CONTENT_TYPE, args.content_type), input)?;
    let options = SealOptions {
        chunk_size: args.chunk_size.unwrap_or(settings.chunk_size),
    };

    if args.deliver {
        let mut blob = Vec::new();
        seal_with(&mut blob, &message, &from, &to, &args.permit, options)?;
        let id = Id::of(&blob);
        let store = open_storehouse(settings)?
            .get(&to)
            .with_context(|| format!("no store for recipient {to}"))?;
        store.put(&id, &blob)?;
        println!("{} Delivered {} bytes", "✓".green().bold(), blob.len());
        println!("  Id: {}", id.to_string().yellow());
        return Ok(());
    }

    let Some(path) = args.output.as_deref() else {
        anyhow::bail!("either --output or --deliver is required");
    };
    let mut out = output_writer(Some(path))?;
    let result = seal_with(&mut out, &message, &from, &to, &args.permit, options)
        .map_err(anyhow::Error::from)
        .and_then(|n| {
            out.flush()?;
            Ok(n)
        });
    drop(out);
    let written = match result {
        Ok(n) => n,
        Err(e) => {
            let _ = fs::remove_file(path);
            return Err(e);
        }
    };
    println!(
        "{} Sealed {} bytes to {}",
        "✓".green().bold(),
        written,
        path.display().to_string().bold()
    );
    Ok(())
}

fn cmd_open(args: OpenArgs, settings: &Settings) -> Result<()> {
    let me = load_identity(&args.me)?;
    let envelope = match (&args.input, &args.id) {
        (Some(path), _) => CipherMessage::parse(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        )?,
        (None, Some(id)) => {
            let id = parse_id(id)?;
            let store = open_storehouse(settings)?.get(me.public_key())?;
            CipherMessage::parse(store.open_blob(&id)?)?
        }
        (None, None) => anyhow::bail!("either an envelope file or --id is required"),
    };
    envelope
        .verify_hash()
        .context("envelope failed its integrity check")?;
    let opened = envelope.unseal(&me)?;
    let message = opened.message()?;
    message.verify_hash()?;

    eprintln!("{} {}", "From:".bold(), opened.sender().public_key());
    if let Some(content_type) = message.content_type() {
        eprintln!("{} {}", "ContentType:".bold(), content_type);
    }
    if let Ok(date_time) = message.date_time() {
        eprintln!("{} {}", "DateTime:".bold(), date_time);
    }
    if let Some(permit) = opened.header().get(reef_envelope::header::PERMIT) {
        if !permit.is_empty() {
            eprintln!("{} {}", "Permit:".bold(), permit);
        }
    }

    let mut out = output_writer(args.output.as_deref())?;
    io::copy(&mut message.content(), &mut out).map_err(EnvelopeError::from)?;
    out.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

fn cmd_store(action: StoreAction, settings: &Settings) -> Result<()> {
    let house = open_storehouse(settings)?;
    match action {
        StoreAction::Init { owner, capacity } => {
            let owner = parse_key(&owner)?;
            let capacity = capacity.unwrap_or(settings.default_capacity);
            let store = house.allocate(&owner, capacity)?;
            println!(
                "{} Allocated store in {}",
                "✓".green().bold(),
                store.root().display().to_string().bold()
            );
            println!("  Owner: {}", owner.to_string().cyan());
            println!("  Capacity: {}", format_capacity(capacity));
        }
        StoreAction::Put { owner, file } => {
            let store = house.get(&parse_key(&owner)?)?;
            let data =
                fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
            let id = Id::of(&data);
            store.put(&id, &data)?;
            println!("{}", id);
        }
        StoreAction::Get { owner, id, output } => {
            let store = house.get(&parse_key(&owner)?)?;
            let mut blob = store.open_blob(&parse_id(&id)?)?;
            let mut out = output_writer(output.as_deref())?;
            io::copy(&mut blob, &mut out)?;
            out.flush()?;
        }
        StoreAction::List {
            owner,
            start,
            limit,
        } => {
            let store = house.get(&parse_key(&owner)?)?;
            for item in store.sequence(start, limit)? {
                let (counter, id) = item?;
                println!("{} {}", format!("{counter:>6}").dimmed(), id);
            }
        }
        StoreAction::Stat { owner: Some(owner) } => {
            let store = house.get(&parse_key(&owner)?)?;
            let (used, capacity) = store.size()?;
            println!("Owner: {}", store.owner().to_string().cyan());
            println!("Root: {}", store.root().display());
            println!("Blobs: {}", store.index().item_count()?);
            println!("Used: {} of {}", used, format_capacity(capacity));
        }
        StoreAction::Stat { owner: None } => {
            let owners = house.owners()?;
            if owners.is_empty() {
                println!("No stores allocated.");
            }
            for owner in owners {
                let (used, capacity) = house.get(&owner)?.size()?;
                println!("{} {} / {}", owner, used, format_capacity(capacity));
            }
        }
    }
    Ok(())
}

fn format_capacity(capacity: u64) -> String {
    if capacity == 0 {
        "unlimited".to_string()
    } else {
        format!("{capacity} bytes")
    }
}
