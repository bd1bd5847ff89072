// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use openssl::x509::X509;
use sdm_sigma::codec::{split_der_chain, Actor, CommandHeader, Structure, StructureType};
use sdm_sigma::store::{ITrustAnchorStore, MemoTrustAnchorStore};
use std::error::Error;
use std::fs;
use tracing::{debug, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
enum SdmSigmaCli {
    Header(HeaderArgs),
    Parse(ParseArgs),
    VerifyCert(VerifyCertArgs),
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Decode a 4-byte mailbox command header given in hex")]
struct HeaderArgs {
    header: String,

    /// The header is in device order (as read off the transport)
    #[arg(short, long)]
    transport: bool,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Decode a binary message and print its fields, hashing the \
    sensitive ones")]
struct ParseArgs {
    #[arg(short, long)]
    structure: String,

    #[arg(short, long, default_value = "firmware")]
    actor: String,

    #[arg(short, long, default_value = "message.bin")]
    file: String,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Check a device certificate chain (PEM or concatenated DER) against \
    the trust anchor store")]
struct VerifyCertArgs {
    #[arg(short, long, default_value = "tastore.json")]
    tastore: String,

    #[arg(short, long, default_value = "chain.pem")]
    chain: String,

    /// Device unique id (16 hex digits) to look up in the revocation list
    #[arg(short, long)]
    device_id: Option<String>,
}

fn main() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    match SdmSigmaCli::parse() {
        SdmSigmaCli::Header(args) => match header(&args) {
            Ok(h) => println!("{h}"),
            Err(e) => eprintln!("header decoding failed: {e}"),
        },

        SdmSigmaCli::Parse(args) => match parse(&args) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("parsing failed: {e}"),
        },

        SdmSigmaCli::VerifyCert(args) => match verify_cert(&args) {
            Ok(()) => println!("verification successful"),
            Err(e) => eprintln!("verification failed: {e}"),
        },
    }
}

fn header(args: &HeaderArgs) -> Result<String, Box<dyn Error>> {
    let b = hex::decode(args.header.trim())?;

    let h = if args.transport {
        CommandHeader::parse_from_transport(&b)?
    } else {
        CommandHeader::parse(&b)?
    };

    let status = match h.validate_status("header") {
        Ok(()) => "ok".to_string(),
        Err(e) => e.to_string(),
    };

    Ok(format!(
        "code: {:#05x}, length: {}, id: {}, client: {} (as status: {status})",
        h.code, h.length, h.id, h.client
    ))
}

fn parse(args: &ParseArgs) -> Result<String, Box<dyn Error>> {
    let ty: StructureType = args.structure.parse()?;
    let actor: Actor = args.actor.parse()?;

    let buf = fs::read(&args.file)?;
    debug!("read {} bytes from {}", buf.len(), args.file);

    Ok(Structure::parse(ty, actor, &buf)?.to_log_string())
}

fn load_chain(path: &str) -> Result<Vec<X509>, Box<dyn Error>> {
    let buf = fs::read(path)?;

    if buf.starts_with(b"-----BEGIN") {
        return Ok(X509::stack_from_pem(&buf)?);
    }

    Ok(split_der_chain(&buf)?
        .into_iter()
        .map(X509::from_der)
        .collect::<Result<Vec<_>, _>>()?)
}

fn verify_cert(args: &VerifyCertArgs) -> Result<(), Box<dyn Error>> {
    let j = fs::read_to_string(&args.tastore)?;

    let mut tas: MemoTrustAnchorStore = Default::default();
    tas.load_json(&j)?;

    let chain = load_chain(&args.chain)?;

    if !tas.verify_chain(&chain) {
        return Err("certificate chain does not lead to a trusted root".into());
    }

    if let Some(id) = &args.device_id {
        let id: [u8; 8] = hex::decode(id)?
            .try_into()
            .map_err(|_| "device id must be 8 bytes")?;

        if tas.is_revoked(&id) {
            return Err(format!("device {} is revoked", hex::encode(id)).into());
        }
    }

    Ok(())
}
