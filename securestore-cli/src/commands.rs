use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use eyre::{eyre, Result, WrapErr};
use securestore_core::envelope::Envelope;
use securestore_core::{KeyContainer, SecureStore, SecureStoreConfig, SoftwareKeyContainer};

use crate::cli::{Cli, Command};

const DATA_DIR_NAME: &str = "securestore";

pub fn execute(cli: &Cli, out: &mut impl Write) -> Result<()> {
    let key_dir = resolve_key_dir(cli.data_dir.as_deref())?;
    tracing::debug!(key_dir = %key_dir.display(), "using software key container");

    let config = load_config(cli.config.as_deref())?;
    let container = Arc::new(SoftwareKeyContainer::persistent(&key_dir));
    let store = SecureStore::new(container.clone(), config.clone());

    match &cli.command {
        Command::Probe => probe(&store, container.as_ref(), &config, out),
        Command::Encrypt {
            text,
            io,
            context,
            base64,
        } => {
            let plaintext = match text {
                Some(text) => text.as_bytes().to_vec(),
                None => read_input(io.input.as_deref())?,
            };
            let context = parse_context(context.as_deref())?;
            let envelope = store
                .try_encrypt(&plaintext, context.as_deref())
                .wrap_err("encrypt failed")?;
            let encoded = if *base64 {
                format!("{}\n", STANDARD.encode(&envelope)).into_bytes()
            } else {
                envelope
            };
            write_output(io.output.as_deref(), &encoded, out)
        }
        Command::Decrypt {
            io,
            context,
            base64,
        } => {
            let envelope = read_envelope(io.input.as_deref(), *base64)?;
            let context = parse_context(context.as_deref())?;
            let plaintext = store
                .try_decrypt(&envelope, context.as_deref())
                .wrap_err("decrypt failed")?;
            write_output(io.output.as_deref(), &plaintext, out)
        }
        Command::Inspect { input, base64 } => {
            let bytes = read_envelope(input.as_deref(), *base64)?;
            inspect(&bytes, out)
        }
    }
}

fn probe(
    store: &SecureStore,
    container: &SoftwareKeyContainer,
    config: &SecureStoreConfig,
    out: &mut impl Write,
) -> Result<()> {
    let policies = config
        .isolation_policies
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let key = container
        .find_key(config.key_alias.clone())
        .wrap_err("failed to query key container")?;

    writeln!(out, "supported:          {}", yes_no(store.is_supported()))?;
    writeln!(out, "enabled:            {}", yes_no(config.enabled))?;
    if let Some(dir) = container.key_dir() {
        writeln!(out, "key directory:      {}", dir.display())?;
    }
    writeln!(out, "key alias:          {}", config.key_alias)?;
    writeln!(out, "isolation policies: {policies}")?;
    match key {
        Some(level) => writeln!(out, "master key:         present ({level})")?,
        None => writeln!(out, "master key:         absent")?,
    }
    Ok(())
}

fn inspect(bytes: &[u8], out: &mut impl Write) -> Result<()> {
    let envelope = Envelope::decode(bytes).map_err(|_| eyre!("invalid envelope"))?;
    writeln!(out, "total:  {} bytes", bytes.len())?;
    writeln!(out, "nonce:  {} bytes", envelope.nonce().len())?;
    writeln!(out, "sealed: {} bytes", envelope.sealed().len())?;
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<SecureStoreConfig> {
    let Some(path) = path else {
        return Ok(SecureStoreConfig::from_env());
    };
    let text = fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read config {}", path.display()))?;
    let config: SecureStoreConfig = serde_json::from_str(&text)
        .wrap_err_with(|| format!("invalid config {}", path.display()))?;
    tracing::debug!(config = %path.display(), "loaded configuration file");
    Ok(config.with_env_overrides())
}

fn resolve_key_dir(data_dir: Option<&Path>) -> Result<PathBuf> {
    match data_dir {
        Some(dir) => Ok(dir.to_path_buf()),
        None => dirs::data_dir()
            .map(|dir| dir.join(DATA_DIR_NAME))
            .ok_or_else(|| eyre!("no platform data directory, pass --data-dir")),
    }
}

fn parse_context(context: Option<&str>) -> Result<Option<Vec<u8>>> {
    context
        .map(|hex_context| hex::decode(hex_context.trim()).wrap_err("context must be hex"))
        .transpose()
}

fn read_input(path: Option<&Path>) -> Result<Vec<u8>> {
    match path {
        Some(path) => {
            fs::read(path).wrap_err_with(|| format!("failed to read {}", path.display()))
        }
        None => {
            let mut buf = Vec::new();
            io::stdin()
                .read_to_end(&mut buf)
                .wrap_err("failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn read_envelope(path: Option<&Path>, base64: bool) -> Result<Vec<u8>> {
    let raw = read_input(path)?;
    if base64 {
        decode_base64(&raw)
    } else {
        Ok(raw)
    }
}

fn decode_base64(raw: &[u8]) -> Result<Vec<u8>> {
    let text: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|byte| !byte.is_ascii_whitespace())
        .collect();
    STANDARD.decode(text).wrap_err("envelope is not valid base64")
}

fn write_output(path: Option<&Path>, bytes: &[u8], out: &mut impl Write) -> Result<()> {
    match path {
        Some(path) => {
            fs::write(path, bytes).wrap_err_with(|| format!("failed to write {}", path.display()))
        }
        None => {
            out.write_all(bytes)?;
            out.flush()?;
            Ok(())
        }
    }
}

const fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
