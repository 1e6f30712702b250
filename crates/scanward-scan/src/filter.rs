//! Risk-based task filtering.

use std::collections::HashSet;

use globset::{Glob, GlobSet, GlobSetBuilder};

use scanward_core::{RiskPolicy, ScanError, ScanTask};

/// Decides which tasks are skipped without invoking an engine.
#[derive(Debug, Clone, Default)]
pub struct RiskFilter {
    excludes: Option<GlobSet>,
    max_file_size: Option<u64>,
    quick_extensions: Option<HashSet<String>>,
}

impl RiskFilter {
    /// A filter that lets every task through.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Build a filter from a policy. With `quick` set, only high-risk
    /// extensions and extensionless files are let through.
    pub fn from_policy(policy: &RiskPolicy, quick: bool) -> Result<Self, ScanError> {
        let excludes = if policy.exclude_patterns.is_empty() {
            None
        } else {
            let mut builder = GlobSetBuilder::new();
            for pattern in &policy.exclude_patterns {
                let glob = Glob::new(pattern).map_err(|e| ScanError::InvalidConfig {
                    message: format!("bad exclude pattern {pattern:?}: {e}"),
                })?;
                builder.add(glob);
            }
            Some(builder.build().map_err(|e| ScanError::InvalidConfig {
                message: e.to_string(),
            })?)
        };

        let quick_extensions = quick.then(|| {
            policy
                .quick_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect()
        });

        Ok(Self {
            excludes,
            max_file_size: policy.max_file_size,
            quick_extensions,
        })
    }

    /// Why `task` should be skipped, or `None` to scan it.
    pub fn skip_reason(&self, task: &ScanTask) -> Option<String> {
        if let Some(excludes) = &self.excludes {
            if excludes.is_match(&task.path) {
                return Some("excluded by pattern".to_string());
            }
        }
        if let Some(limit) = self.max_file_size {
            if task.size > limit {
                return Some(format!("larger than {limit} bytes"));
            }
        }
        if let Some(extensions) = &self.quick_extensions {
            if let Some(ext) = task.extension() {
                if !extensions.contains(&ext) {
                    return Some("low-risk file type".to_string());
                }
            }
        }
        None
    }
}
