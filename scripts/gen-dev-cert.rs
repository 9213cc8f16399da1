//! Dev certificate generator - run with `cargo run --manifest-path scripts/Cargo.toml`
//!
//! Writes a self-signed localhost certificate to certs/, where the server looks
//! for it when TLS_CERT_PATH and TLS_KEY_PATH are unset.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use ring::digest::{digest, SHA256};
use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::{Duration, SystemTime};

const CERT_DIR: &str = "../certs";
const CERT_FILE: &str = "../certs/cert.pem";
const KEY_FILE: &str = "../certs/key.pem";

// Browsers refuse serverCertificateHashes for certificates valid longer than 14 days
const VALIDITY: Duration = Duration::from_secs(14 * 24 * 60 * 60);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let force = std::env::args().any(|arg| arg == "--force");

    if !force && Path::new(CERT_FILE).exists() && Path::new(KEY_FILE).exists() {
        println!("Certificates already exist in {}/ (pass --force to regenerate)", CERT_DIR);
        print_hashes()?;
        return Ok(());
    }

    println!("Generating Spore Arena development certificate...\n");
    fs::create_dir_all(CERT_DIR)?;

    let mut params = CertificateParams::new(vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
        "::1".to_string(),
    ])?;

    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, "Spore Arena Dev");
    name.push(DnType::OrganizationName, "Development");
    params.distinguished_name = name;

    let now = SystemTime::now();
    params.not_before = now.into();
    params.not_after = (now + VALIDITY).into();

    let key_pair = KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;

    fs::write(CERT_FILE, cert.pem())?;
    fs::write(KEY_FILE, key_pair.serialize_pem())?;
    println!("Wrote {} and {}\n", CERT_FILE, KEY_FILE);

    print_hashes()
}

fn print_hashes() -> Result<(), Box<dyn std::error::Error>> {
    let cert_pem = fs::read_to_string(CERT_FILE)?;
    let pem = pem::parse(&cert_pem)?;

    // SHA-256 of the DER certificate, as logged by the server on startup
    let cert_hash = STANDARD.encode(digest(&SHA256, pem.contents()).as_ref());
    println!("Certificate hash (serverCertificateHashes):");
    println!("  {}\n", cert_hash);

    match spki_hash() {
        Ok(spki) => {
            println!("Chrome flag:");
            println!("  --ignore-certificate-errors-spki-list={}", spki);
        }
        Err(e) => println!("Could not compute SPKI hash ({}); is openssl installed?", e),
    }

    Ok(())
}

/// SHA-256 of the SubjectPublicKeyInfo, computed with openssl
fn spki_hash() -> Result<String, Box<dyn std::error::Error>> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(format!(
            "openssl x509 -in {} -pubkey -noout 2>/dev/null | openssl pkey -pubin -outform der 2>/dev/null | openssl dgst -sha256 -binary | base64",
            CERT_FILE
        ))
        .output()?;

    if output.status.success() {
        Ok(String::from_utf8(output.stdout)?.trim().to_string())
    } else {
        Err("openssl failed".into())
    }
}
