//! Code Generation
//!
//! Device codes, user codes and OAuth state tokens.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Symbols a user code is drawn from.
pub const USER_CODE_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
/// Symbols per user-code group.
pub const USER_CODE_GROUP_LEN: usize = 4;

const DEVICE_CODE_BYTES: usize = 40;
const STATE_BYTES: usize = 32;

/// Code generator interface (for dependency injection).
pub trait CodeGenerator: Send + Sync {
    /// Secret polling key for the CLI.
    fn device_code(&self) -> String;

    /// Human-typable code, `XXXX-XXXX`.
    fn user_code(&self) -> String;

    /// OAuth CSRF token.
    fn state(&self) -> String;
}

/// Generator backed by the thread-local CSPRNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultCodeGenerator;

impl DefaultCodeGenerator {
    pub fn new() -> Self {
        Self
    }

    fn random_token(len: usize) -> String {
        let mut bytes = vec![0u8; len];
        rand::thread_rng().fill(bytes.as_mut_slice());
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

impl CodeGenerator for DefaultCodeGenerator {
    fn device_code(&self) -> String {
        Self::random_token(DEVICE_CODE_BYTES)
    }

    fn user_code(&self) -> String {
        let mut rng = rand::thread_rng();
        let raw: String = (0..USER_CODE_GROUP_LEN * 2)
            .map(|_| USER_CODE_ALPHABET[rng.gen_range(0..USER_CODE_ALPHABET.len())] as char)
            .collect();
        format!(
            "{}-{}",
            &raw[..USER_CODE_GROUP_LEN],
            &raw[USER_CODE_GROUP_LEN..]
        )
    }

    fn state(&self) -> String {
        Self::random_token(STATE_BYTES)
    }
}

/// Normalize a user-entered code for lookup: drop hyphens and whitespace, uppercase.
pub fn normalize_user_code(code: &str) -> String {
    code.chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .flat_map(|c| c.to_uppercase())
        .collect()
}

/// Deterministic generator for testing.
///
/// Queued values are handed out first; afterwards codes are derived from a counter.
#[derive(Default)]
pub struct SequenceCodeGenerator {
    counter: AtomicU64,
    device_codes: Mutex<VecDeque<String>>,
    user_codes: Mutex<VecDeque<String>>,
    states: Mutex<VecDeque<String>>,
}

impl SequenceCodeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next device code.
    pub fn queue_device_code(&self, code: impl Into<String>) -> &Self {
        push(&self.device_codes, code.into());
        self
    }

    /// Queue the next user code.
    pub fn queue_user_code(&self, code: impl Into<String>) -> &Self {
        push(&self.user_codes, code.into());
        self
    }

    /// Queue the next state.
    pub fn queue_state(&self, state: impl Into<String>) -> &Self {
        push(&self.states, state.into());
        self
    }

    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

fn push(queue: &Mutex<VecDeque<String>>, value: String) {
    queue
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .push_back(value);
}

fn pop(queue: &Mutex<VecDeque<String>>) -> Option<String> {
    queue
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .pop_front()
}

impl CodeGenerator for SequenceCodeGenerator {
    fn device_code(&self) -> String {
        pop(&self.device_codes).unwrap_or_else(|| format!("device-code-{}", self.next()))
    }

    fn user_code(&self) -> String {
        pop(&self.user_codes).unwrap_or_else(|| {
            let n = self.next() % 10_000;
            format!("TEST-{:04}", n)
        })
    }

    fn state(&self) -> String {
        pop(&self.states).unwrap_or_else(|| format!("state-{}", self.next()))
    }
}
