use anyhow::{Context, Result};
use nix::unistd::Uid;
use std::path::Path;

use crate::error::RootstrapError;

/// Smallest subordinate range we can build a mapping from.
pub const SUBRANGE: u32 = 65536;

/// One `name:start:count` record from `/etc/subuid` or `/etc/subgid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubIdRange {
    pub start: u32,
    pub count: u32,
}

/**
 * Finds the record for the invoking user, matched by numeric uid or by login
 * name, in the contents of a subordinate id file.
 */
pub fn parse_subrange(
    contents: &str,
    uid: Uid,
    user: Option<&str>,
    path: &Path,
) -> Result<SubIdRange> {
    let uid_str = uid.to_string();
    let who = user.map_or(uid_str.clone(), String::from);

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.splitn(3, ':');
        let (Some(name), Some(start), Some(count)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(RootstrapError::PrivilegeSetup(format!(
                "Malformed line '{}' in {}",
                line,
                path.display()
            ))
            .into());
        };

        if name != uid_str && Some(name) != user {
            continue;
        }

        let parse = |value: &str| {
            value.trim().parse::<u32>().map_err(|_| {
                RootstrapError::PrivilegeSetup(format!(
                    "Invalid number '{}' in line '{}' of {}",
                    value,
                    line,
                    path.display()
                ))
            })
        };
        let start = parse(start)?;
        let count = parse(count)?;

        if count < SUBRANGE {
            return Err(RootstrapError::PrivilegeSetup(format!(
                "subuid/subgid range length must be at least {}, got {} for {} from line '{}'",
                SUBRANGE, count, who, line
            ))
            .into());
        }

        return Ok(SubIdRange { start, count });
    }

    Err(RootstrapError::PrivilegeSetup(format!(
        "No mapping found for {} in {}",
        who,
        path.display()
    ))
    .into())
}

pub fn read_subrange(path: &Path, uid: Uid, user: Option<&str>) -> Result<SubIdRange> {
    let contents = std::fs::read_to_string(path)
        .context(format!("failed to read {}", path.display()))?;
    parse_subrange(&contents, uid, user, path)
}
