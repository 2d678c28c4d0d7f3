use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value;

use tapquest::config::AttestConfig;
use tapquest::crypto::{
    envelope_key_from_slice, generate_envelope_keypair, SignatureScheme, TapSigningKey,
};
use tapquest::domain::{EncryptedEnvelope, MessagePayload, Quest, SignerCategory};
use tapquest::infra::{EnvelopeProtocol, TapParams, TapVerifier};
use tapquest::session::{Session, SessionKeys};
use tapquest::telemetry::{init_telemetry, TelemetryConfig};

fn print_help() {
    eprintln!(
        "\
tapquest-admin

USAGE:
  tapquest-admin <command> [options]

COMMANDS:
  keygen                          Generate an envelope or tap key pair
  simulate-tap                    Sign a counter message like a tag would
  verify-tap <url|query>          Verify tap parameters
  encrypt                         Seal a payload into an envelope
  decrypt                         Open an envelope
  quest-progress                  Ingest envelopes and score a quest

keygen OPTIONS:
  --kind <envelope|tap>           (default: envelope)
  --scheme <secp256k1|p256>       (tap only; default: TAP_SIGNATURE_SCHEME)

simulate-tap OPTIONS:
  --secret-key <hex>              (required) Tap secret key
  --nonce <n>                     (required) Counter value
  --randomness <hex>              (default: 00000000)
  --tag <hex>                     (default: 04c1; prepended to pkN)

verify-tap OPTIONS:
  --category <person|location>    (default: person)

encrypt OPTIONS:
  --secret-key <hex>              (required) Sender envelope secret key
  --recipient <hex>               (required) Recipient envelope public key
  --type <message_type>           (required)
  --data <json>                   (required) Payload data
  --name <display_name>           (default: tapquest-admin)

decrypt OPTIONS:
  --secret-key <hex>              (required) Recipient envelope secret key
  --input <path>                  (default: stdin) Envelope JSON

quest-progress OPTIONS:
  --secret-key <hex>              (required) Recipient envelope secret key
  --quest <path>                  (required) Quest JSON
  --envelopes <path>              (required) JSON array of envelopes

ENV:
  TAP_SIGNATURE_SCHEME / TAP_COUNTER_PREFIX_HEX / TAP_PUBLIC_KEY_TAG_LEN
  TAP_REPLAY_WINDOW / ENVELOPE_MAX_PAYLOAD_BYTES / LOG_LEVEL / LOG_JSON
"
    );
}

fn next_value(args: &mut VecDeque<String>, flag: &str) -> anyhow::Result<String> {
    args.pop_front()
        .ok_or_else(|| anyhow::anyhow!("missing value for {flag}"))
}

fn require(value: Option<String>, flag: &str) -> anyhow::Result<String> {
    value.ok_or_else(|| anyhow::anyhow!("{flag} is required"))
}

fn bytes32(label: &str, hex_str: &str) -> anyhow::Result<[u8; 32]> {
    let bytes = hex::decode(hex_str.trim())
        .map_err(|e| anyhow::anyhow!("invalid {label} hex: {e}"))?;
    envelope_key_from_slice(&bytes).map_err(|_| anyhow::anyhow!("invalid {label} length"))
}

fn read_input(path: Option<&str>) -> anyhow::Result<String> {
    match path {
        Some(path) if path != "-" => Ok(std::fs::read_to_string(path)?),
        _ => Ok(std::io::read_to_string(std::io::stdin())?),
    }
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args: VecDeque<String> = std::env::args().skip(1).collect();
    let Some(command) = args.pop_front() else {
        print_help();
        return Ok(());
    };

    if matches!(command.as_str(), "-h" | "--help" | "help") {
        print_help();
        return Ok(());
    }

    let mut telemetry = TelemetryConfig::from_env();
    telemetry.service_name = "tapquest-admin".to_string();
    if std::env::var("LOG_LEVEL").is_err() && std::env::var("RUST_LOG").is_err() {
        telemetry.log_level = "warn".to_string();
    }
    init_telemetry(&telemetry).map_err(|e| anyhow::anyhow!("telemetry init failed: {e}"))?;

    let config = AttestConfig::try_from_env()?;

    match command.as_str() {
        "keygen" => {
            let mut kind = "envelope".to_string();
            let mut scheme = config.signature_scheme;
            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--kind" => kind = next_value(&mut args, "--kind")?,
                    "--scheme" => {
                        let raw = next_value(&mut args, "--scheme")?;
                        scheme = SignatureScheme::parse(&raw)
                            .ok_or_else(|| anyhow::anyhow!("unknown scheme: {raw}"))?;
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            match kind.as_str() {
                "envelope" => {
                    let (sk, pk) = generate_envelope_keypair();
                    println!("secret_key: {}", hex::encode(sk));
                    println!("public_key: {}", hex::encode(pk));
                }
                "tap" => {
                    let key = TapSigningKey::generate(scheme);
                    println!("scheme:     {}", scheme);
                    println!("secret_key: {}", hex::encode(key.to_bytes()));
                    println!("public_key: {}", hex::encode(key.public_key_bytes()));
                }
                other => anyhow::bail!("unknown key kind: {other}"),
            }
            Ok(())
        }
        "simulate-tap" => {
            let mut secret_key: Option<String> = None;
            let mut nonce: Option<u32> = None;
            let mut randomness = "00000000".to_string();
            let mut tag = "04c1".to_string();
            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--secret-key" => secret_key = Some(next_value(&mut args, "--secret-key")?),
                    "--nonce" => nonce = Some(next_value(&mut args, "--nonce")?.parse()?),
                    "--randomness" => randomness = next_value(&mut args, "--randomness")?,
                    "--tag" => tag = next_value(&mut args, "--tag")?,
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }
            let secret_key = require(secret_key, "--secret-key")?;
            let nonce = nonce.ok_or_else(|| anyhow::anyhow!("--nonce is required"))?;

            let key = TapSigningKey::from_bytes(config.signature_scheme, &hex::decode(secret_key.trim())?)?;
            let verifier = TapVerifier::new(&config);
            let message = verifier.codec().build(nonce, &randomness)?;
            let signature = key.sign(&message);

            println!(
                "pk1={}{}&rnd={:08x}{}&rndsig={}",
                tag,
                hex::encode(key.public_key_bytes()),
                nonce,
                randomness,
                hex::encode(signature)
            );
            Ok(())
        }
        "verify-tap" => {
            let mut input: Option<String> = None;
            let mut category = SignerCategory::Person;
            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--category" => {
                        let raw = next_value(&mut args, "--category")?;
                        category = SignerCategory::parse(&raw)
                            .ok_or_else(|| anyhow::anyhow!("unknown category: {raw}"))?;
                    }
                    other if input.is_none() && !other.starts_with("--") => {
                        input = Some(other.to_string());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }
            let input = require(input, "<url|query>")?;

            let verifier = TapVerifier::new(&config);
            let attestation = verifier.verify(&TapParams::from_query(&input), category)?;
            print_json(&attestation)
        }
        "encrypt" => {
            let mut secret_key: Option<String> = None;
            let mut recipient: Option<String> = None;
            let mut message_type: Option<String> = None;
            let mut data: Option<String> = None;
            let mut name = "tapquest-admin".to_string();
            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--secret-key" => secret_key = Some(next_value(&mut args, "--secret-key")?),
                    "--recipient" => recipient = Some(next_value(&mut args, "--recipient")?),
                    "--type" => message_type = Some(next_value(&mut args, "--type")?),
                    "--data" => data = Some(next_value(&mut args, "--data")?),
                    "--name" => name = next_value(&mut args, "--name")?,
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }
            let secret_key = bytes32("--secret-key", &require(secret_key, "--secret-key")?)?;
            let recipient = bytes32("--recipient", &require(recipient, "--recipient")?)?;
            let message_type = require(message_type, "--type")?;
            let data: Value = serde_json::from_str(&require(data, "--data")?)?;

            let protocol = EnvelopeProtocol::new(&config)?;
            let payload = MessagePayload::from_parts(&message_type, data)?;
            let envelope =
                protocol.seal_envelope(&payload, &secret_key, &name, &recipient, chrono::Utc::now())?;
            print_json(&envelope)
        }
        "decrypt" => {
            let mut secret_key: Option<String> = None;
            let mut input: Option<String> = None;
            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--secret-key" => secret_key = Some(next_value(&mut args, "--secret-key")?),
                    "--input" => input = Some(next_value(&mut args, "--input")?),
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }
            let secret_key = bytes32("--secret-key", &require(secret_key, "--secret-key")?)?;
            let raw: Value = serde_json::from_str(&read_input(input.as_deref())?)?;

            let protocol = EnvelopeProtocol::new(&config)?;
            let message = protocol.decrypt_value(&raw, &secret_key)?;
            print_json(&message)
        }
        "quest-progress" => {
            let mut secret_key: Option<String> = None;
            let mut quest_path: Option<String> = None;
            let mut envelopes_path: Option<String> = None;
            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--secret-key" => secret_key = Some(next_value(&mut args, "--secret-key")?),
                    "--quest" => quest_path = Some(next_value(&mut args, "--quest")?),
                    "--envelopes" => envelopes_path = Some(next_value(&mut args, "--envelopes")?),
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }
            let secret_key = bytes32("--secret-key", &require(secret_key, "--secret-key")?)?;
            let quest: Quest =
                serde_json::from_str(&std::fs::read_to_string(require(quest_path, "--quest")?)?)?;
            let envelopes: Vec<EncryptedEnvelope> = serde_json::from_str(
                &std::fs::read_to_string(require(envelopes_path, "--envelopes")?)?,
            )?;

            let keys = SessionKeys::from_secret_key(secret_key, "tapquest-admin")?;
            let session = Arc::new(Session::new(config, keys)?);
            for (index, result) in session.ingest_batch(envelopes).await.into_iter().enumerate() {
                if let Err(e) = result {
                    eprintln!("skipped envelope {index}: {e}");
                }
            }

            print_json(&session.quest_progress(&quest))
        }
        other => {
            print_help();
            anyhow::bail!("unknown command: {other}")
        }
    }
}
