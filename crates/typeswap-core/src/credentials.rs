//! Credential rotation.
//!
//! Each service owns an ordered list of credentials. The next one handed out
//! is the lowest-positioned credential above the highest position already
//! used; once the end of the list is reached the rotation wraps to the
//! lowest position.

use crate::models::CredentialEntry;

/// Where the next credential in a rotation comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextCredential {
    /// Index into the slice passed to [`next_credential_index`].
    pub index: usize,
    /// True when the rotation ran off the end and restarted at the lowest
    /// position.
    pub wrapped: bool,
}

/// Pick the next credential of one service.
///
/// `credentials` must all belong to the same service; order does not matter.
pub fn next_credential_index(credentials: &[CredentialEntry]) -> Option<NextCredential> {
    let highest_used = credentials
        .iter()
        .filter(|c| c.is_used())
        .map(|c| c.position)
        .max()
        .unwrap_or(0);

    let after = credentials
        .iter()
        .enumerate()
        .filter(|(_, c)| c.position > highest_used)
        .min_by_key(|(_, c)| c.position)
        .map(|(index, _)| NextCredential {
            index,
            wrapped: false,
        });

    after.or_else(|| {
        credentials
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| c.position)
            .map(|(index, _)| NextCredential {
                index,
                wrapped: true,
            })
    })
}

/// Position for a credential appended to a service.
pub fn next_position(credentials: &[CredentialEntry]) -> u64 {
    credentials.iter().map(|c| c.position).max().unwrap_or(0) + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(position: u64, used: bool) -> CredentialEntry {
        CredentialEntry {
            id: position,
            service_id: 1,
            content: format!("cred-{}", position),
            position,
            last_used: used.then(Utc::now),
        }
    }

    #[test]
    fn empty_service_has_no_next() {
        assert_eq!(next_credential_index(&[]), None);
    }

    #[test]
    fn fresh_service_starts_at_lowest_position() {
        let creds = vec![entry(3, false), entry(1, false), entry(2, false)];
        let next = next_credential_index(&creds).unwrap();
        assert_eq!(creds[next.index].position, 1);
        assert!(!next.wrapped);
    }

    #[test]
    fn skips_past_highest_used() {
        let creds = vec![entry(1, true), entry(2, false), entry(5, false)];
        let next = next_credential_index(&creds).unwrap();
        assert_eq!(creds[next.index].position, 2);

        let creds = vec![entry(1, false), entry(2, true), entry(5, false)];
        let next = next_credential_index(&creds).unwrap();
        assert_eq!(creds[next.index].position, 5);
    }

    #[test]
    fn wraps_after_last_position() {
        let creds = vec![entry(1, true), entry(2, true), entry(3, true)];
        let next = next_credential_index(&creds).unwrap();
        assert_eq!(creds[next.index].position, 1);
        assert!(next.wrapped);
    }

    #[test]
    fn appended_position_follows_maximum() {
        assert_eq!(next_position(&[]), 1);
        assert_eq!(next_position(&[entry(4, false), entry(2, true)]), 5);
    }
}
