// src/bin/admin.rs

//! The administrative CLI for the encrypted configuration store.
//!
//! All operations work against the database directly and require the private
//! identity, so they can run while the server is up or down; the server picks
//! up a new generation on its next reload.

use anyhow::{Context, Result, anyhow, bail};
use millrace::config::Config;
use millrace::crypto::Identity;
use millrace::db::{self, DbOptions};
use millrace::store::{ConfigStore, DEFAULT_SCOPE};
use std::env;
use std::path::Path;

const USAGE: &str = "\
Usage: millrace-admin --db <path> --identity <path> <command> [args]

Commands:
  init                       append a default config (creates the identity file if missing)
  set <path> <value>         edit a TOML path in the latest config and append a new generation
  list [scope]               enumerate generations
  dump [scope]               print the latest plaintext
  save <file> [scope]        replace the latest config with the file contents
  diff <generation> [scope]  compare a generation against the latest
  rollback <generation>      append a copy of an older generation as the new latest
  rotate-jwt-secrets         replace all JWT secrets with fresh random values
  add-oauth2 <provider>      add an OAuth2 provider section
  rm-oauth2 <provider>       remove an OAuth2 provider section
";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("millrace-admin: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() || args.contains(&"--help".to_string()) {
        print!("{USAGE}");
        return Ok(());
    }

    let mut db_path: Option<String> = None;
    let mut identity_path: Option<String> = None;
    let mut rest: Vec<String> = Vec::new();

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--db" => db_path = Some(iter.next().ok_or_else(|| anyhow!("--db requires a value"))?),
            "--identity" => {
                identity_path =
                    Some(iter.next().ok_or_else(|| anyhow!("--identity requires a value"))?)
            }
            _ => rest.push(arg),
        }
    }

    let db_path = db_path.ok_or_else(|| anyhow!("--db is required"))?;
    let identity_path = identity_path.ok_or_else(|| anyhow!("--identity is required"))?;
    let (command, command_args) = rest
        .split_first()
        .ok_or_else(|| anyhow!("no command given\n\n{USAGE}"))?;

    // `init` bootstraps the identity; everything else requires it to exist.
    let identity = if command.as_str() == "init" && !Path::new(&identity_path).exists() {
        let identity = Identity::generate();
        std::fs::write(&identity_path, format!("{}\n", identity.to_hex()))
            .with_context(|| format!("writing identity file '{identity_path}'"))?;
        eprintln!("generated new identity at '{identity_path}'");
        identity
    } else {
        Identity::load(&identity_path)?
    };

    let pool = db::connect(&DbOptions {
        path: db_path,
        ..DbOptions::default()
    })
    .await?;
    let store = ConfigStore::new(pool, identity);

    match (command.as_str(), command_args) {
        ("init", []) => init(&store).await,
        ("set", [path, value]) => set(&store, path, value).await,
        ("list", scope_arg) => list(&store, scope_of(scope_arg)?).await,
        ("dump", scope_arg) => dump(&store, scope_of(scope_arg)?).await,
        ("save", [file]) => save(&store, file, DEFAULT_SCOPE).await,
        ("save", [file, scope]) => save(&store, file, scope).await,
        ("diff", [generation]) => diff(&store, generation, DEFAULT_SCOPE).await,
        ("diff", [generation, scope]) => diff(&store, generation, scope).await,
        ("rollback", [generation]) => rollback(&store, generation).await,
        ("rotate-jwt-secrets", []) => rotate_jwt_secrets(&store).await,
        ("add-oauth2", [provider]) => add_oauth2(&store, provider).await,
        ("rm-oauth2", [provider]) => rm_oauth2(&store, provider).await,
        _ => bail!("unknown command or wrong arguments\n\n{USAGE}"),
    }
}

fn scope_of(args: &[String]) -> Result<&str> {
    match args {
        [] => Ok(DEFAULT_SCOPE),
        [scope] => Ok(scope.as_str()),
        _ => bail!("too many arguments\n\n{USAGE}"),
    }
}

async fn init(store: &ConfigStore) -> Result<()> {
    if !store.generations(DEFAULT_SCOPE).await?.is_empty() {
        bail!("scope '{DEFAULT_SCOPE}' is already initialized; use `save` or `set` to change it");
    }
    let config = Config::default();
    let generation = store
        .save(
            DEFAULT_SCOPE,
            config.to_toml()?.as_bytes(),
            "toml",
            "initial default config",
        )
        .await?;
    println!("initialized scope '{DEFAULT_SCOPE}' at generation {generation}");
    Ok(())
}

async fn set(store: &ConfigStore, path: &str, value: &str) -> Result<()> {
    let mut table = latest_table(store).await?;
    set_path(&mut table, path, parse_value(value))?;
    save_validated(store, &table, &format!("set {path}")).await
}

async fn list(store: &ConfigStore, scope: &str) -> Result<()> {
    let generations = store.generations(scope).await?;
    if generations.is_empty() {
        bail!("no generations for scope '{scope}'");
    }
    for info in generations {
        println!(
            "{:>8}  {}  {:6}  {}",
            info.generation,
            info.created_at.to_rfc3339(),
            info.format,
            info.description
        );
    }
    Ok(())
}

async fn dump(store: &ConfigStore, scope: &str) -> Result<()> {
    let plaintext = store.latest(scope).await?;
    print!("{}", String::from_utf8_lossy(&plaintext));
    Ok(())
}

async fn save(store: &ConfigStore, file: &str, scope: &str) -> Result<()> {
    let contents =
        std::fs::read_to_string(file).with_context(|| format!("reading '{file}'"))?;
    if scope == DEFAULT_SCOPE {
        // Validate before persisting so a bad file can never become latest.
        Config::from_toml(&contents)?;
    }
    let generation = store
        .save(scope, contents.as_bytes(), "toml", &format!("saved from {file}"))
        .await?;
    println!("saved '{file}' as generation {generation} of scope '{scope}'");
    Ok(())
}

async fn diff(store: &ConfigStore, generation: &str, scope: &str) -> Result<()> {
    let generation: i64 = generation.parse().context("generation must be a number")?;
    let (old, _) = store.get(scope, generation).await?;
    let new = store.latest(scope).await?;
    let old = String::from_utf8_lossy(&old);
    let new = String::from_utf8_lossy(&new);

    if old == new {
        println!("generation {generation} is identical to the latest");
        return Ok(());
    }
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    for i in 0..old_lines.len().max(new_lines.len()) {
        match (old_lines.get(i), new_lines.get(i)) {
            (Some(o), Some(n)) if o == n => {}
            (Some(o), Some(n)) => {
                println!("- {o}");
                println!("+ {n}");
            }
            (Some(o), None) => println!("- {o}"),
            (None, Some(n)) => println!("+ {n}"),
            (None, None) => {}
        }
    }
    Ok(())
}

async fn rollback(store: &ConfigStore, generation: &str) -> Result<()> {
    let generation: i64 = generation.parse().context("generation must be a number")?;
    let (plaintext, format) = store.get(DEFAULT_SCOPE, generation).await?;
    let new_generation = store
        .save(
            DEFAULT_SCOPE,
            &plaintext,
            &format,
            &format!("rollback to generation {generation}"),
        )
        .await?;
    println!("generation {generation} is now generation {new_generation}");
    Ok(())
}

async fn rotate_jwt_secrets(store: &ConfigStore) -> Result<()> {
    let mut table = latest_table(store).await?;
    for secret in [
        "jwt.auth_secret",
        "jwt.verification_secret",
        "jwt.password_reset_secret",
        "jwt.email_change_secret",
    ] {
        set_path(&mut table, secret, toml::Value::String(random_secret()?))?;
    }
    save_validated(store, &table, "rotate jwt secrets").await
}

async fn add_oauth2(store: &ConfigStore, provider: &str) -> Result<()> {
    let mut table = latest_table(store).await?;
    let mut entry = toml::Table::new();
    let urls: [(&str, &str); 3] = match provider {
        "github" => [
            ("auth_url", "https://github.com/login/oauth/authorize"),
            ("token_url", "https://github.com/login/oauth/access_token"),
            ("user_info_url", "https://api.github.com/user"),
        ],
        "google" => [
            ("auth_url", "https://accounts.google.com/o/oauth2/v2/auth"),
            ("token_url", "https://oauth2.googleapis.com/token"),
            ("user_info_url", "https://openidconnect.googleapis.com/v1/userinfo"),
        ],
        _ => [("auth_url", ""), ("token_url", ""), ("user_info_url", "")],
    };
    entry.insert("client_id".to_string(), toml::Value::String(String::new()));
    entry.insert("client_secret".to_string(), toml::Value::String(String::new()));
    for (key, url) in urls {
        entry.insert(key.to_string(), toml::Value::String(url.to_string()));
    }
    set_path(
        &mut table,
        &format!("oauth2.{provider}"),
        toml::Value::Table(entry),
    )?;
    save_validated(store, &table, &format!("add oauth2 provider {provider}")).await
}

async fn rm_oauth2(store: &ConfigStore, provider: &str) -> Result<()> {
    let mut table = latest_table(store).await?;
    let removed = table
        .get_mut("oauth2")
        .and_then(|v| v.as_table_mut())
        .and_then(|t| t.remove(provider))
        .is_some();
    if !removed {
        bail!("no oauth2 provider '{provider}' in the latest config");
    }
    save_validated(store, &table, &format!("remove oauth2 provider {provider}")).await
}

// --- helpers ---

async fn latest_table(store: &ConfigStore) -> Result<toml::Table> {
    let plaintext = store.latest(DEFAULT_SCOPE).await?;
    let contents = String::from_utf8(plaintext).context("config payload is not valid UTF-8")?;
    contents.parse::<toml::Table>().context("parsing latest config")
}

/// Re-validates the edited document and appends it as a new generation.
async fn save_validated(store: &ConfigStore, table: &toml::Table, description: &str) -> Result<()> {
    let contents = toml::to_string_pretty(table)?;
    Config::from_toml(&contents)?;
    let generation = store
        .save(DEFAULT_SCOPE, contents.as_bytes(), "toml", description)
        .await?;
    println!("saved generation {generation}");
    Ok(())
}

/// Walks a dotted path, creating intermediate tables, and sets the leaf.
fn set_path(table: &mut toml::Table, path: &str, value: toml::Value) -> Result<()> {
    let mut segments = path.split('.').peekable();
    let mut current = table;
    while let Some(segment) = segments.next() {
        if segment.is_empty() {
            bail!("empty segment in path '{path}'");
        }
        if segments.peek().is_none() {
            current.insert(segment.to_string(), value);
            return Ok(());
        }
        current = current
            .entry(segment.to_string())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()))
            .as_table_mut()
            .ok_or_else(|| anyhow!("'{segment}' in '{path}' is not a table"))?;
    }
    unreachable!("split always yields at least one segment");
}

/// Interprets the raw value as a TOML literal where possible, falling back to
/// a plain string.
fn parse_value(raw: &str) -> toml::Value {
    format!("v = {raw}")
        .parse::<toml::Table>()
        .ok()
        .and_then(|mut t| t.remove("v"))
        .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}

fn random_secret() -> Result<String> {
    let mut bytes = [0u8; 32];
    getrandom::fill(&mut bytes).map_err(|e| anyhow!("system RNG unavailable: {e}"))?;
    Ok(hex::encode(bytes))
}
