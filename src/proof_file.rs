//! Versioned proof file
//!
//! ```text
//! magic   b"TINYIVC\0"            8 bytes
//! version u16, big-endian         2 bytes
//! payload ark-compressed ProofBundle
//! ```
//!
//! The bundle carries everything an offline verifier needs besides the SRS:
//! the proof, the key stack, the ECCVM / Translator keys and the digest of the
//! `[τ]G₂` the proof was produced against.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::io::{Read, Write};
use std::path::Path;

use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};

use crate::client_ivc::{ClientIvc, Proof};
use crate::goblin::{EccvmVerificationKey, TranslatorVerificationKey};
use crate::keys::DeciderVerificationKey;

pub const FILE_MAGIC: &[u8; 8] = b"TINYIVC\0";
pub const FILE_VERSION: u16 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ProofFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] ark_serialize::SerializationError),
    #[error("bad proof file: missing magic header")]
    BadMagic,
    #[error("unsupported proof version: got {got}, support {supported}")]
    UnsupportedVersion { got: u16, supported: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct ProofBundle {
    pub proof: Proof,
    pub accumulator_vk: DeciderVerificationKey,
    pub final_vk: DeciderVerificationKey,
    pub eccvm_vk: EccvmVerificationKey,
    pub translator_vk: TranslatorVerificationKey,
    pub srs_g2_digest: Vec<u8>,
}

impl ProofBundle {
    /// Run [`ClientIvc::verify`] on the bundled proof and keys.
    pub fn verify(&self) -> bool {
        ClientIvc::verify(&self.proof, &self.accumulator_vk, &self.final_vk, &self.eccvm_vk, &self.translator_vk)
    }
}

pub fn write_proof<W: Write>(mut w: W, bundle: &ProofBundle) -> Result<usize, ProofFileError> {
    let mut payload = Vec::new();
    bundle.serialize_compressed(&mut payload)?;
    w.write_all(FILE_MAGIC)?;
    w.write_all(&FILE_VERSION.to_be_bytes())?;
    w.write_all(&payload)?;
    w.flush()?;
    Ok(payload.len())
}

pub fn read_proof<R: Read>(mut r: R) -> Result<ProofBundle, ProofFileError> {
    let mut magic = [0u8; 8];
    r.read_exact(&mut magic)?;
    if &magic != FILE_MAGIC {
        return Err(ProofFileError::BadMagic);
    }
    let mut ver = [0u8; 2];
    r.read_exact(&mut ver)?;
    let got = u16::from_be_bytes(ver);
    if got != FILE_VERSION {
        return Err(ProofFileError::UnsupportedVersion { got, supported: FILE_VERSION });
    }
    let mut payload = Vec::new();
    r.read_to_end(&mut payload)?;
    Ok(ProofBundle::deserialize_compressed(payload.as_slice())?)
}

pub fn write_proof_file(path: impl AsRef<Path>, bundle: &ProofBundle) -> Result<usize, ProofFileError> {
    write_proof(std::fs::File::create(path)?, bundle)
}

pub fn read_proof_file(path: impl AsRef<Path>) -> Result<ProofBundle, ProofFileError> {
    read_proof(std::fs::File::open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::VerificationKey;

    fn dummy_bundle() -> ProofBundle {
        let vk = VerificationKey {
            circuit_size: 512,
            log_circuit_size: 9,
            num_public_inputs: 16,
            pub_inputs_offset: 129,
            recursive_proof_public_input_indices: (0..16).collect(),
            selector_comms: Vec::new(),
        };
        ProofBundle {
            proof: Proof::default(),
            accumulator_vk: vk.clone().into(),
            final_vk: vk.into(),
            eccvm_vk: EccvmVerificationKey { table_size: 256 },
            translator_vk: TranslatorVerificationKey { table_size: 256 },
            srs_g2_digest: vec![7u8; 32],
        }
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ivc_proof.bin");
        let bundle = dummy_bundle();
        write_proof_file(&path, &bundle).unwrap();
        assert_eq!(read_proof_file(&path).unwrap(), bundle);
    }

    #[test]
    fn header_is_checked() {
        let mut bytes = Vec::new();
        write_proof(&mut bytes, &dummy_bundle()).unwrap();

        let mut wrong_version = bytes.clone();
        wrong_version[9] = 9;
        assert!(matches!(
            read_proof(wrong_version.as_slice()),
            Err(ProofFileError::UnsupportedVersion { got: 9, supported: FILE_VERSION })
        ));

        bytes[0] = b'X';
        assert!(matches!(read_proof(bytes.as_slice()), Err(ProofFileError::BadMagic)));
    }

    #[test]
    fn truncated_payload_is_a_serialization_error() {
        let mut bytes = Vec::new();
        let payload = write_proof(&mut bytes, &dummy_bundle()).unwrap();
        bytes.truncate(bytes.len() - payload / 2);
        let err = read_proof(bytes.as_slice()).unwrap_err();
        assert!(matches!(err, ProofFileError::Serialization(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
