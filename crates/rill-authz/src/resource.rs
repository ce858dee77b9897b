//! Resource matching patterns used when applying policy rules to
//! authorization requests.
//!
//! A pattern names a set of broker resources, optionally narrowed to a set of
//! clusters:
//!
//! ```text
//! topic:orders-*
//! kafka-cluster:prod*,topic:orders-*
//! group:analytics
//! ```
//!
//! A segment value ending in `*` is a prefix match; anything else is exact.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ResourceSpecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Topic,
    Group,
    Cluster,
    TransactionalId,
    DelegationToken,
}

impl ResourceType {
    /// Canonical uppercase name, the form authorization requests carry.
    pub fn name(&self) -> &'static str {
        match self {
            ResourceType::Topic => "TOPIC",
            ResourceType::Group => "GROUP",
            ResourceType::Cluster => "CLUSTER",
            ResourceType::TransactionalId => "TRANSACTIONAL_ID",
            ResourceType::DelegationToken => "DELEGATION_TOKEN",
        }
    }

    /// Lowercase keyword used in pattern strings.
    fn keyword(&self) -> &'static str {
        match self {
            ResourceType::Topic => "topic",
            ResourceType::Group => "group",
            ResourceType::Cluster => "cluster",
            ResourceType::TransactionalId => "transactionalid",
            ResourceType::DelegationToken => "delegationtoken",
        }
    }

    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "topic" => Some(ResourceType::Topic),
            "group" => Some(ResourceType::Group),
            "cluster" => Some(ResourceType::Cluster),
            "transactionalid" => Some(ResourceType::TransactionalId),
            "delegationtoken" => Some(ResourceType::DelegationToken),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An exact or prefix name match.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NamePattern {
    value: String,
    starts_with: bool,
}

impl NamePattern {
    fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => Self {
                value: prefix.to_string(),
                starts_with: true,
            },
            None => Self {
                value: pattern.to_string(),
                starts_with: false,
            },
        }
    }

    fn matches(&self, name: &str) -> bool {
        if self.starts_with {
            name.starts_with(&self.value)
        } else {
            name == self.value
        }
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)?;
        if self.starts_with {
            f.write_str("*")?;
        }
        Ok(())
    }
}

/// A parsed resource pattern: at most one `kafka-cluster:` segment and
/// exactly one resource segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    cluster: Option<NamePattern>,
    resource_type: ResourceType,
    resource: NamePattern,
}

const CLUSTER_SEGMENT: &str = "kafka-cluster";

impl ResourceSpec {
    pub fn parse(pattern: &str) -> Result<Self, ResourceSpecError> {
        let mut cluster: Option<NamePattern> = None;
        let mut resource: Option<(ResourceType, NamePattern)> = None;

        for segment in pattern.split(',') {
            let pieces: Vec<&str> = segment.split(':').collect();
            if pieces.len() != 2 || pieces[1].is_empty() {
                return Err(ResourceSpecError::MissingSeparator {
                    pattern: pattern.to_string(),
                    segment: segment.to_string(),
                });
            }
            let segment_type = pieces[0].to_ascii_lowercase();
            let name = pieces[1];

            if segment_type == CLUSTER_SEGMENT {
                if cluster.is_some() {
                    return Err(ResourceSpecError::DuplicateCluster {
                        pattern: pattern.to_string(),
                    });
                }
                cluster = Some(NamePattern::parse(name));
                continue;
            }

            if resource.is_some() {
                return Err(ResourceSpecError::DuplicateResource {
                    pattern: pattern.to_string(),
                });
            }
            let resource_type = ResourceType::from_keyword(&segment_type).ok_or_else(|| {
                ResourceSpecError::UnknownType {
                    pattern: pattern.to_string(),
                    segment: pieces[0].to_string(),
                }
            })?;
            resource = Some((resource_type, NamePattern::parse(name)));
        }

        let Some((resource_type, resource)) = resource else {
            return Err(ResourceSpecError::MissingResource {
                pattern: pattern.to_string(),
            });
        };
        Ok(Self {
            cluster,
            resource_type,
            resource,
        })
    }

    /// Match a specific resource against this pattern.
    ///
    /// A pattern without a cluster segment ignores the `cluster` argument;
    /// with one, the request must name a matching cluster. The resource type
    /// is compared against the canonical uppercase name (see
    /// [`ResourceType::name`]).
    pub fn matches(&self, cluster: Option<&str>, resource_type: &str, name: &str) -> bool {
        if let Some(pattern) = &self.cluster {
            match cluster {
                Some(cluster) if pattern.matches(cluster) => {}
                _ => return false,
            }
        }
        if resource_type != self.resource_type.name() {
            return false;
        }
        self.resource.matches(name)
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    /// Re-emit the pattern in its parseable lowercase form.
    pub fn to_canonical(&self) -> String {
        let mut out = String::new();
        if let Some(cluster) = &self.cluster {
            out.push_str(CLUSTER_SEGMENT);
            out.push(':');
            out.push_str(&cluster.to_string());
            out.push(',');
        }
        out.push_str(self.resource_type.keyword());
        out.push(':');
        out.push_str(&self.resource.to_string());
        out
    }
}

impl fmt::Display for ResourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical())
    }
}

impl FromStr for ResourceSpec {
    type Err = ResourceSpecError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}
