//! Assignment publishing and per-student session records.
//!
//! Assignments live under `assignment_<CODE>` and are read-only once
//! published; each student's session lives under `session_<CODE>`.

use std::collections::HashSet;

use punt_core::{AssignmentConfig, SessionState, ValidationError};
use rand::Rng;
use tracing::{debug, info};

use crate::{KvStore, StoreError, load, save};

pub const CODE_LEN: usize = 8;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub fn assignment_key(code: &str) -> String {
    format!("assignment_{code}")
}

pub fn session_key(code: &str) -> String {
    format!("session_{code}")
}

/// Trim and uppercase a student code, rejecting anything that cannot be one.
pub fn normalize_code(raw: &str) -> Result<String, ValidationError> {
    let code = raw.trim().to_uppercase();
    let valid = code.len() == CODE_LEN && code.chars().all(|c| c.is_ascii_alphanumeric());
    if valid {
        Ok(code)
    } else {
        Err(ValidationError::InvalidCode(raw.trim().to_string()))
    }
}

pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Store `config` under `count` fresh student codes and return the codes.
pub fn publish_assignment<S, R>(
    store: &S,
    config: &AssignmentConfig,
    count: usize,
    rng: &mut R,
) -> Result<Vec<String>, StoreError>
where
    S: KvStore + ?Sized,
    R: Rng + ?Sized,
{
    if config.assignment_text.trim().is_empty() {
        return Err(ValidationError::EmptyAssignment.into());
    }
    if !config.has_rubric() {
        return Err(ValidationError::EmptyRubric.into());
    }
    if count == 0 {
        return Err(StoreError::NoStudents);
    }

    let mut codes = Vec::with_capacity(count);
    let mut seen = HashSet::new();
    while codes.len() < count {
        let code = generate_code(rng);
        if !seen.insert(code.clone()) || store.get(&assignment_key(&code))?.is_some() {
            debug!(%code, "code collision, drawing again");
            continue;
        }
        save(store, &assignment_key(&code), config)?;
        codes.push(code);
    }
    info!(count, level = %config.level, "assignment published");
    Ok(codes)
}

/// Look up the assignment behind a student code.
pub fn load_assignment<S: KvStore + ?Sized>(
    store: &S,
    raw_code: &str,
) -> Result<AssignmentConfig, StoreError> {
    let code = normalize_code(raw_code)?;
    load(store, &assignment_key(&code))?
        .ok_or_else(|| ValidationError::InvalidCode(code).into())
}

pub fn save_session<S: KvStore + ?Sized>(store: &S, session: &SessionState) -> Result<(), StoreError> {
    save(store, &session_key(session.code()), session)
}

pub fn load_session<S: KvStore + ?Sized>(
    store: &S,
    raw_code: &str,
) -> Result<Option<SessionState>, StoreError> {
    let code = normalize_code(raw_code)?;
    load(store, &session_key(&code))
}

/// Resume the session for a code, or start one. The code must name an assignment.
pub fn open_session<S: KvStore + ?Sized>(
    store: &S,
    raw_code: &str,
) -> Result<(AssignmentConfig, SessionState), StoreError> {
    let assignment = load_assignment(store, raw_code)?;
    let code = normalize_code(raw_code)?;
    let session = match load_session(store, &code)? {
        Some(session) => session,
        None => {
            info!(%code, "new session");
            SessionState::new(code)
        }
    };
    Ok((assignment, session))
}
