//! The per-shard request/reply byte encodings.

use smd_doc::Document;

/// The six verbs the dispatch engine's grouping loop iterates (search is
/// excluded — it never leaves the process, see the crate-level docs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// Declare a namespace's scheme.
    ApplyScheme = 0,
    /// Retrieve a namespace's scheme.
    GetScheme = 1,
    /// Insert a new record.
    Insert = 2,
    /// Overwrite fields on an existing record.
    Update = 3,
    /// Remove a record.
    Delete = 4,
    /// Retrieve a record's fields.
    Get = 5,
}

impl Verb {
    /// Whether this verb's reply fragment is a length-prefixed document
    /// (`get-scheme`, `get`) rather than a single `u8 ok` byte.
    pub fn replies_with_document(self) -> bool {
        matches!(self, Verb::GetScheme | Verb::Get)
    }
}

fn nul_terminated(s: &str) -> Vec<u8> {
    let mut out = s.as_bytes().to_vec();
    out.push(0);
    out
}

/// Encode an `apply-scheme` operation payload: namespace, then the scheme
/// document's length and bytes.
pub fn encode_apply_scheme(namespace: &str, scheme_doc: &Document) -> Vec<u8> {
    let mut out = nul_terminated(namespace);
    let body = scheme_doc.encode();
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);
    out
}

/// Encode a `get-scheme` operation payload: just the namespace.
pub fn encode_get_scheme(namespace: &str) -> Vec<u8> {
    nul_terminated(namespace)
}

/// Encode an `insert`/`update` operation payload: namespace, key, then the
/// values document's length and bytes.
pub fn encode_record_write(namespace: &str, key: &str, values: &Document) -> Vec<u8> {
    let mut out = nul_terminated(namespace);
    out.extend_from_slice(&nul_terminated(key));
    let body = values.encode();
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);
    out
}

/// Encode a `delete`/`get` operation payload: namespace, key.
pub fn encode_key_ref(namespace: &str, key: &str) -> Vec<u8> {
    let mut out = nul_terminated(namespace);
    out.extend_from_slice(&nul_terminated(key));
    out
}

/// A per-shard request: one verb, the semantics flags that applied when it
/// was enqueued, and the packed operation payloads.
pub fn encode_request(verb: Verb, consistency: u8, safety: u8, persistency: u8, payloads: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(verb as u8);
    out.push(consistency);
    out.push(safety);
    out.push(persistency);
    out.extend_from_slice(&(payloads.len() as u32).to_le_bytes());
    for payload in payloads {
        out.extend_from_slice(payload);
    }
    out
}

/// One reply fragment: either a decoded document (`None` meaning "not
/// found") or a plain success/failure flag.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyFragment {
    /// `get`/`get-scheme`: the retrieved document, or `None` if not found.
    Document(Option<Document>),
    /// Any other verb: whether the operation succeeded.
    Ok(bool),
}

/// Encode a single reply fragment.
pub fn encode_reply(fragment: &ReplyFragment) -> Vec<u8> {
    match fragment {
        ReplyFragment::Document(Some(doc)) => {
            let body = doc.encode();
            let mut out = (body.len() as u32).to_le_bytes().to_vec();
            out.extend_from_slice(&body);
            out
        }
        ReplyFragment::Document(None) => 0u32.to_le_bytes().to_vec(),
        ReplyFragment::Ok(ok) => vec![*ok as u8],
    }
}

/// A failure decoding a reply fragment.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WireError {
    /// The byte stream ended before a complete fragment could be read.
    #[error("unexpected end of reply stream")]
    UnexpectedEof,
    /// A document fragment's bytes did not decode.
    #[error("malformed document in reply: {0}")]
    MalformedDocument(String),
}

/// Decode one reply fragment for `verb` from the front of `bytes`, returning
/// the fragment and the remaining bytes.
pub fn decode_reply<'a>(verb: Verb, bytes: &'a [u8]) -> Result<(ReplyFragment, &'a [u8]), WireError> {
    if verb.replies_with_document() {
        let len_bytes = bytes.get(..4).ok_or(WireError::UnexpectedEof)?;
        let len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
        let rest = &bytes[4..];
        if len == 0 {
            return Ok((ReplyFragment::Document(None), rest));
        }
        let body = rest.get(..len).ok_or(WireError::UnexpectedEof)?;
        let doc = Document::decode(body).map_err(|e| WireError::MalformedDocument(e.to_string()))?;
        Ok((ReplyFragment::Document(Some(doc)), &rest[len..]))
    } else {
        let byte = *bytes.first().ok_or(WireError::UnexpectedEof)?;
        Ok((ReplyFragment::Ok(byte != 0), &bytes[1..]))
    }
}
