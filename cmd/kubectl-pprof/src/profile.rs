// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fmt;
use std::str::FromStr;

use crate::errors::ConfigError;

/// Profile kinds served under `/debug/pprof/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileKind {
    Cpu,
    Heap,
    Block,
    Goroutine,
    Mutex,
    Threadcreate,
}

impl ProfileKind {
    pub const ALL: [ProfileKind; 6] = [
        ProfileKind::Cpu,
        ProfileKind::Heap,
        ProfileKind::Block,
        ProfileKind::Goroutine,
        ProfileKind::Mutex,
        ProfileKind::Threadcreate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileKind::Cpu => "cpu",
            ProfileKind::Heap => "heap",
            ProfileKind::Block => "block",
            ProfileKind::Goroutine => "goroutine",
            ProfileKind::Mutex => "mutex",
            ProfileKind::Threadcreate => "threadcreate",
        }
    }

    /// HTTP path of the endpoint serving this profile.
    ///
    /// The CPU profile is collected from `/debug/pprof/profile`, every other
    /// kind from `/debug/pprof/<kind>`.
    pub fn endpoint_path(&self) -> String {
        match self {
            ProfileKind::Cpu => "/debug/pprof/profile".to_string(),
            kind => format!("/debug/pprof/{}", kind.as_str()),
        }
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ConfigError::EmptyProfile);
        }
        ProfileKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownProfile(s.to_string()))
    }
}
