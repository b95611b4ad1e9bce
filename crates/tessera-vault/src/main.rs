//! Tessera - PIN provisioning and wallet unlock from the command line
//!
//! PINs are read line by line from stdin and fed through the same capture
//! state machine a graphical front end would drive.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tessera_core::{representation, PinCapture, PinResult, PinValidationError};
use tessera_vault::{
    Argon2Stretch, AttestationKeyManager, FailureReason, FileSecureStore, KeyDerivationPipeline,
    MaterialStatus, ProvisioningCoordinator, ProvisioningState, SoftwareAttestationService,
    UnsupportedAttestationService, VaultConfig,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "PIN-protected wallet key provisioning", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to $TESSERA_CONFIG or the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the data directory from the config file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Choose and confirm a PIN, then write wallet material
    Provision {
        /// Provision again even if material already exists
        #[arg(long)]
        force: bool,
    },

    /// Derive the wallet unlock key from a PIN
    Unlock,

    /// Show which secure material is present
    Status,

    /// Produce an attestation object for a server challenge
    Attest {
        /// Challenge bytes (hex)
        #[arg(short, long)]
        challenge: String,
    },

    /// Forget the attestation key id
    Reset,
}

/// Outcome of reading one line of PIN input
enum Entry {
    Done(PinResult),
    /// The line was not an acceptable PIN; the same step should be re-opened
    Rejected(PinValidationError),
}

/// Line-oriented PIN source
struct PinReader<R> {
    input: R,
}

impl<R: BufRead> PinReader<R> {
    /// Feed one line through `capture`; an empty line or EOF cancels
    fn read(&mut self, mut capture: PinCapture) -> Result<Entry> {
        eprintln!("{}", representation::render(capture.representation()));

        let mut line = zeroize::Zeroizing::new(String::new());
        if self.input.read_line(&mut line)? == 0 {
            return Ok(Entry::Done(capture.cancel()));
        }
        let entry = line.trim_end_matches(['\r', '\n']);
        if entry.is_empty() {
            return Ok(Entry::Done(capture.cancel()));
        }

        for c in entry.chars() {
            let mut buf = [0u8; 4];
            let character = c.encode_utf8(&mut buf);
            if !capture.is_valid_pin_character(character) {
                return Ok(Entry::Rejected(PinValidationError::InvalidCharacter(c)));
            }
            if !capture.can_add() {
                match capture.config().policy.max_length {
                    Some(max) => return Ok(Entry::Rejected(PinValidationError::TooLong { max })),
                    None => bail!("PIN entry rejected"),
                }
            }
            capture.try_add(character)?;
        }

        eprintln!("{}", representation::render(capture.representation()));
        if !capture.can_commit() {
            match capture.validation_error() {
                Some(e) => return Ok(Entry::Rejected(e)),
                None => bail!("PIN entry rejected"),
            }
        }
        Ok(Entry::Done(capture.try_commit()?))
    }

    /// Read lines until one commits or cancels, opening a fresh session each time
    fn read_pin(&mut self, open: impl Fn() -> Result<PinCapture>) -> Result<PinResult> {
        loop {
            match self.read(open()?)? {
                Entry::Done(result) => return Ok(result),
                Entry::Rejected(e) => eprintln!("{}. Try again.", e),
            }
        }
    }
}

/// Resolve the config; only `bootstrap` writes a default file to disk
fn load_config(cli: &Cli, bootstrap: bool) -> Result<VaultConfig> {
    let config_path = cli.config.clone().unwrap_or_else(VaultConfig::default_path);
    let mut config = if bootstrap {
        VaultConfig::load_or_default(&config_path)
    } else if config_path.exists() {
        VaultConfig::load(&config_path)
    } else {
        Ok(VaultConfig::default())
    }
    .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    config.validate()?;
    Ok(config)
}

struct Vault {
    config: VaultConfig,
    store: Arc<FileSecureStore>,
    pipeline: Arc<KeyDerivationPipeline>,
}

impl Vault {
    fn open(config: VaultConfig) -> Result<Self> {
        config.ensure_directories()?;

        let store = Arc::new(FileSecureStore::open(config.store_path())?);
        let stretch = Arc::new(Argon2Stretch::new(config.stretch.clone())?);
        let pipeline = Arc::new(KeyDerivationPipeline::new(
            store.clone(),
            stretch,
            config.derivation_params(),
        ));

        info!("Using data directory {:?}", config.data_dir);
        Ok(Self {
            config,
            store,
            pipeline,
        })
    }

    /// Software attestation; the seed is generated on first use
    fn attestation(&self) -> Result<AttestationKeyManager> {
        let seed_path = self.config.attestation_seed_path();
        let service = SoftwareAttestationService::load_or_create(seed_path)?;
        Ok(AttestationKeyManager::new(self.store.clone(), Arc::new(service)))
    }

    /// Key id bookkeeping only; never touches the attestation seed
    fn attestation_keys(&self) -> AttestationKeyManager {
        AttestationKeyManager::new(self.store.clone(), Arc::new(UnsupportedAttestationService))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only command output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tessera=info,tessera_vault=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let bootstrap = matches!(cli.command, Commands::Provision { .. });
    let vault = Vault::open(load_config(&cli, bootstrap)?)?;
    let mut reader = PinReader {
        input: io::stdin().lock(),
    };

    match cli.command {
        Commands::Provision { force } => provision(&vault, &mut reader, force).await,
        Commands::Unlock => unlock(&vault, &mut reader),
        Commands::Status => status(&vault),
        Commands::Attest { challenge } => attest(&vault, &challenge).await,
        Commands::Reset => {
            vault.attestation_keys().reset().await?;
            println!("Attestation key id removed");
            Ok(())
        }
    }
}

async fn provision<R: BufRead>(
    vault: &Vault,
    reader: &mut PinReader<R>,
    force: bool,
) -> Result<()> {
    if !force && vault.pipeline.material_status()? != MaterialStatus::Unprovisioned {
        bail!("Wallet material already exists; pass --force to provision again");
    }

    let coordinator =
        ProvisioningCoordinator::new(vault.pipeline.clone(), vault.config.pin.clone());
    coordinator.show_instructions()?;
    eprintln!("Choose a PIN. It unlocks this wallet on this device only and cannot be recovered.");
    coordinator.begin_entry()?;

    loop {
        match coordinator.state() {
            ProvisioningState::InitialEntry => {
                eprintln!("Enter PIN (empty line cancels):");
                let result = reader.read_pin(|| Ok(coordinator.open_capture()?))?;
                coordinator.submit(result).await?;
            }
            ProvisioningState::ConfirmationEntry => {
                eprintln!("Confirm PIN (empty line starts over):");
                let result = reader.read_pin(|| Ok(coordinator.open_capture()?))?;
                coordinator.submit(result).await?;
            }
            ProvisioningState::Failure(FailureReason::ConfirmationMismatch) => {
                eprintln!("{}", PinValidationError::ConfirmationMismatch);
                coordinator.retry()?;
            }
            ProvisioningState::Failure(FailureReason::Derivation(reason)) => {
                bail!("Provisioning failed: {}", reason);
            }
            ProvisioningState::Success => {
                println!("Wallet provisioned");
                return Ok(());
            }
            ProvisioningState::Onboarding | ProvisioningState::Abandoned => {
                println!("Provisioning cancelled");
                return Ok(());
            }
            state => bail!("Unexpected provisioning state: {}", state),
        }
    }
}

fn unlock<R: BufRead>(vault: &Vault, reader: &mut PinReader<R>) -> Result<()> {
    let config = tessera_core::PinCaptureConfig {
        reveal_digits: vault.config.pin.reveal_digits,
        ..tessera_core::PinCaptureConfig::initial(vault.config.pin.policy())
    };

    eprintln!("Enter PIN:");
    match reader.read_pin(|| Ok(PinCapture::new(config.clone())))? {
        PinResult::Pin(pin) => {
            let key = vault.pipeline.get_wallet_key(&pin)?;
            println!("{}", key.expose());
            Ok(())
        }
        PinResult::Cancelled => bail!("Unlock cancelled"),
    }
}

fn status(vault: &Vault) -> Result<()> {
    match vault.pipeline.material_status()? {
        MaterialStatus::Unprovisioned => println!("Wallet:      not provisioned"),
        MaterialStatus::Provisioned => println!("Wallet:      provisioned"),
        MaterialStatus::Partial { missing } => {
            let names: Vec<&str> = missing.iter().map(|slot| slot.name()).collect();
            println!("Wallet:      incomplete (missing {})", names.join(", "));
        }
    }

    match vault.attestation_keys().stored_key_id()? {
        Some(key_id) => println!("Attestation: key {}", key_id),
        None => println!("Attestation: no key"),
    }
    println!("Data dir:    {}", vault.config.data_dir.display());
    Ok(())
}

async fn attest(vault: &Vault, challenge: &str) -> Result<()> {
    let challenge = hex::decode(challenge).context("Challenge must be hex")?;
    if challenge.is_empty() {
        bail!("Challenge must not be empty");
    }

    let object = vault.attestation()?.attest(&challenge).await?;
    println!("{}", object.to_base64());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};
    use tessera_core::{PinCaptureConfig, PinPolicy, PinSecret};
    use tessera_vault::StretchParams;

    fn reader(input: &str) -> PinReader<io::Cursor<Vec<u8>>> {
        PinReader {
            input: io::Cursor::new(input.as_bytes().to_vec()),
        }
    }

    fn capture() -> PinCapture {
        PinCapture::new(PinCaptureConfig::initial(PinPolicy::default()))
    }

    fn read(input: &str) -> Result<Entry> {
        reader(input).read(capture())
    }

    fn test_vault() -> (TempDir, Vault) {
        let dir = tempdir().unwrap();
        let config = VaultConfig {
            data_dir: dir.path().join("tessera"),
            pbkdf2_iterations: 100,
            stretch: StretchParams::insecure_fast(),
            ..Default::default()
        };
        let vault = Vault::open(config).unwrap();
        (dir, vault)
    }

    #[test]
    fn test_reads_complete_pin() {
        assert!(matches!(
            read("123456\n").unwrap(),
            Entry::Done(PinResult::Pin(pin)) if pin == PinSecret::from("123456")
        ));
    }

    #[test]
    fn test_empty_line_and_eof_cancel() {
        assert!(matches!(read("\n").unwrap(), Entry::Done(PinResult::Cancelled)));
        assert!(matches!(read("").unwrap(), Entry::Done(PinResult::Cancelled)));
    }

    #[test]
    fn test_rejects_bad_entries() {
        assert!(matches!(
            read("12a456\n").unwrap(),
            Entry::Rejected(PinValidationError::InvalidCharacter('a'))
        ));
        assert!(matches!(
            read("1234567\n").unwrap(),
            Entry::Rejected(PinValidationError::TooLong { max: 6 })
        ));
        assert!(matches!(read("123\n").unwrap(), Entry::Rejected(_)));
    }

    #[test]
    fn test_rejected_entry_is_asked_again() {
        let mut reader = reader("123\n12x456\n123456\n");
        let result = reader.read_pin(|| Ok(capture())).unwrap();
        assert_eq!(result, PinResult::Pin(PinSecret::from("123456")));
    }

    #[tokio::test]
    async fn test_provision_survives_short_pin() {
        let (_dir, vault) = test_vault();
        let mut reader = reader("123\n123456\n123456\n");

        provision(&vault, &mut reader, false).await.unwrap();
        assert_eq!(
            vault.pipeline.material_status().unwrap(),
            MaterialStatus::Provisioned
        );
    }

    #[tokio::test]
    async fn test_only_attest_creates_seed() {
        let (_dir, vault) = test_vault();
        let seed_path = vault.config.attestation_seed_path();

        status(&vault).unwrap();
        vault.attestation_keys().reset().await.unwrap();
        assert!(!seed_path.exists());

        attest(&vault, "00ff").await.unwrap();
        assert!(seed_path.exists());
        assert!(vault.attestation_keys().stored_key_id().unwrap().is_some());
    }

    #[test]
    fn test_read_only_commands_do_not_write_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        let args = |command: &str| {
            Cli::parse_from([
                "tessera",
                "--config",
                config_path.to_str().unwrap(),
                "--data-dir",
                dir.path().join("data").to_str().unwrap(),
                command,
            ])
        };

        load_config(&args("status"), false).unwrap();
        assert!(!config_path.exists());

        let config = load_config(&args("provision"), true).unwrap();
        assert!(config_path.exists());
        assert_eq!(config.data_dir, dir.path().join("data"));
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::parse_from(["tessera", "--data-dir", "/tmp/t", "attest", "-c", "00ff"]);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/t")));
        assert!(matches!(cli.command, Commands::Attest { ref challenge } if challenge == "00ff"));
    }
}
