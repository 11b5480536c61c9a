// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of acad-cmd and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::OnceLock;

use regex::Regex;

/// Unversioned identity. Tried last: it can resolve to an unrelated product install.
pub const GENERIC_IDENTITY: &str = "AutoCAD.Application";

const NEWEST_KNOWN_MAJOR: u32 = 30;
const OLDEST_KNOWN_MAJOR: u32 = 19;

fn versioned(major: u32) -> String {
    format!("{GENERIC_IDENTITY}.{major}")
}

/// Identities to attach to, in preference order: the pinned major, then known versioned
/// identities newest to oldest, then the registry alias, then the generic identity.
pub fn candidate_identities(target_major: Option<u32>, registry_alias: Option<&str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |identity: String| {
        if !out.contains(&identity) {
            out.push(identity);
        }
    };

    if let Some(major) = target_major {
        push(versioned(major));
    }
    for major in (OLDEST_KNOWN_MAJOR..=NEWEST_KNOWN_MAJOR).rev() {
        push(versioned(major));
    }
    if let Some(alias) = registry_alias.map(str::trim).filter(|alias| !alias.is_empty()) {
        push(alias.to_owned());
    }
    push(GENERIC_IDENTITY.to_owned());
    out
}

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?P<major>\d+)\.(?P<minor>\d+)").expect("valid version regex"))
}

/// Major component of an `ACADVER` value, e.g. `23.1s (LMS Tech)` -> 23.
pub fn parse_version_major(raw: &str) -> Option<u32> {
    let trimmed = raw.trim().trim_matches(|c| c == '"' || c == '\'');
    let captures = version_regex().captures(trimmed)?;
    captures.name("major")?.as_str().parse().ok()
}
