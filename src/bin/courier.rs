//! Courier CLI: operator tooling for vaults and message envelopes.
//!
//! Usage:
//!   courier keygen  --name <NAME>
//!   courier seal    --sender <ID> --sender-key <NAME>.pub --recipient-key <PEER>.pub [--in <FILE>]
//!   courier open    --identity <ID> --vault <NAME>.vault [--in <FILE>]
//!   courier inspect <FILE>
//!
//! Passwords come from `COURIER_PASSWORD`, or are prompted for on the
//! terminal with echo disabled.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use courier_e2e::{
    register, vault, CourierConfig, EnvelopeCodec, Identity, MessageEnvelope, PrivateKeyVault,
    VaultPassword, WrappedPrivateKey,
};

const PASSWORD_ENV: &str = "COURIER_PASSWORD";

/// End-to-end encryption tooling for direct messages.
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(version, about, long_about = None)]
struct Cli {
    /// JSON configuration file; defaults apply to missing fields
    #[arg(long, env = "COURIER_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a keypair and wrap the private key under a password
    Keygen {
        /// Writes <NAME>.pub and <NAME>.vault
        #[arg(short, long)]
        name: PathBuf,
    },
    /// Seal a message into an envelope (JSON on stdout)
    Seal {
        /// Sender identity written to `created_by`
        #[arg(long)]
        sender: String,

        /// Sender public key, so they can read their own history
        #[arg(long)]
        sender_key: PathBuf,

        #[arg(long)]
        recipient_key: PathBuf,

        /// Plaintext file; stdin if omitted
        #[arg(short, long = "in")]
        input: Option<PathBuf>,
    },
    /// Open an envelope with a password-wrapped private key
    Open {
        /// Identity of the reader; selects which wrapped key copy is used
        #[arg(long)]
        identity: String,

        #[arg(long)]
        vault: PathBuf,

        /// Envelope JSON file; stdin if omitted
        #[arg(short, long = "in")]
        input: Option<PathBuf>,
    },
    /// Show envelope or vault metadata (no decryption)
    Inspect {
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Keygen { name } => cmd_keygen(&config, &name),
        Command::Seal {
            sender,
            sender_key,
            recipient_key,
            input,
        } => cmd_seal(&sender, &sender_key, &recipient_key, input.as_deref()),
        Command::Open {
            identity,
            vault,
            input,
        } => cmd_open(&config, &identity, &vault, input.as_deref()),
        Command::Inspect { file } => cmd_inspect(&file),
    }
}

fn load_config(path: Option<&Path>) -> Result<CourierConfig> {
    let Some(path) = path else {
        return Ok(CourierConfig::default());
    };
    let json = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    Ok(CourierConfig::from_json_str(&json)?)
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) => fs::read_to_string(p).with_context(|| format!("reading {}", p.display())),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).context("reading stdin")?;
            Ok(buf)
        }
    }
}

/// `COURIER_PASSWORD` if set, otherwise a hidden terminal prompt.
fn read_password(prompt: &str) -> Result<VaultPassword> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(VaultPassword::new(password));
    }
    let password = rpassword::prompt_password(prompt).context("reading password")?;
    Ok(VaultPassword::new(password))
}

fn cmd_keygen(config: &CourierConfig, name: &Path) -> Result<()> {
    let password = read_password("New vault password: ")?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .context("starting runtime")?;
    let registration = runtime.block_on(register(&password, config))?;

    let pub_path = name.with_extension("pub");
    let vault_path = name.with_extension("vault");
    fs::write(&pub_path, &registration.public_key_pem)
        .with_context(|| format!("writing {}", pub_path.display()))?;
    fs::write(&vault_path, registration.wrapped_private_key.as_str())
        .with_context(|| format!("writing {}", vault_path.display()))?;

    eprintln!("Generated keypair:");
    eprintln!("  Public key:  {}", pub_path.display());
    eprintln!("  Vault:       {}", vault_path.display());
    eprintln!("  RSA bits:    {}", config.rsa_key_bits);
    eprintln!("  KDF rounds:  {}", config.vault.kdf_iterations);
    Ok(())
}

fn cmd_seal(
    sender: &str,
    sender_key: &Path,
    recipient_key: &Path,
    input: Option<&Path>,
) -> Result<()> {
    let sender_pem = fs::read_to_string(sender_key)
        .with_context(|| format!("reading {}", sender_key.display()))?;
    let recipient_pem = fs::read_to_string(recipient_key)
        .with_context(|| format!("reading {}", recipient_key.display()))?;
    let plaintext = read_input(input)?;

    let envelope = EnvelopeCodec::new().seal(
        &plaintext,
        &Identity::new(sender),
        &sender_pem,
        &recipient_pem,
    )?;
    println!("{}", envelope.to_json()?);
    Ok(())
}

fn cmd_open(
    config: &CourierConfig,
    identity: &str,
    vault_path: &Path,
    input: Option<&Path>,
) -> Result<()> {
    let envelope = MessageEnvelope::from_json(&read_input(input)?)?;
    if !envelope.is_encrypted() {
        eprintln!("warning: message was sent unencrypted");
        println!("{}", envelope.ciphertext);
        return Ok(());
    }

    let wrapped = WrappedPrivateKey::new(
        fs::read_to_string(vault_path)
            .with_context(|| format!("reading {}", vault_path.display()))?,
    );
    let password = read_password("Vault password: ")?;
    let vault = PrivateKeyVault::new(config.vault.clone());
    let (_, private_key) = vault.unwrap_key(&wrapped, &password)?;
    let plaintext =
        EnvelopeCodec::new().open_with_key(&envelope, &private_key, &Identity::new(identity))?;
    print!("{}", plaintext);
    Ok(())
}

fn cmd_inspect(path: &Path) -> Result<()> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;

    if let Ok(envelope) = MessageEnvelope::from_json(&contents) {
        println!("Courier Envelope");
        println!("================");
        println!("Sender:          {}", envelope.sender);
        if let Some(id) = &envelope.id {
            println!("Id:              {}", id);
        }
        if let Some(at) = envelope.created_at {
            println!("Created:         {}", at.to_rfc3339());
        }
        println!("Encrypted:       {}", envelope.is_encrypted());
        println!("IV:              {}", envelope.iv);
        println!("Ciphertext:      {} chars", envelope.ciphertext.len());
        println!("Sender key:      {} chars", envelope.encrypted_key_for_sender.len());
        println!("Recipient key:   {} chars", envelope.encrypted_key_for_recipient.len());
        return Ok(());
    }

    let info = match vault::inspect(&WrappedPrivateKey::new(contents)) {
        Ok(info) => info,
        Err(_) => bail!("{} is neither an envelope nor a vault", path.display()),
    };
    println!("Courier Vault");
    println!("=============");
    println!("Version:         {}", info.version);
    println!("KDF:             0x{:02X} (PBKDF2-HMAC-SHA256)", info.kdf);
    println!("Iterations:      {}", info.iterations);
    println!("Total Size:      {} bytes", info.total_bytes);
    println!("Ciphertext:      {} bytes", info.ciphertext_bytes);
    Ok(())
}
