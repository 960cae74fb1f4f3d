//! # Topic Names
//!
//! Decomposes topic strings into their structured parts.
//!
//! Accepted forms:
//!
//! ```text
//! <topic>                                   → persistent://public/default/<topic>
//! <tenant>/<namespace>/<topic>              → persistent://<tenant>/<namespace>/<topic>
//! <tenant>/<cluster>/<namespace>/<topic>    → legacy form with cluster
//! persistent://<tenant>/<namespace>/<topic>
//! non-persistent://<tenant>/<namespace>/<topic>
//! ```
//!
//! A `-partition-N` suffix on the local name marks one partition of a
//! partitioned topic.

use crate::errors::{TopicNameError, TopicNameResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tenant assumed for single-segment topic names.
pub const PUBLIC_TENANT: &str = "public";

/// Namespace assumed for single-segment topic names.
pub const DEFAULT_NAMESPACE: &str = "default";

const PARTITION_SUFFIX: &str = "-partition-";

/// Persistence scheme of a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TopicDomain {
    /// Messages are stored durably by the broker.
    Persistent,
    /// Messages are only dispatched to connected consumers.
    NonPersistent,
}

impl TopicDomain {
    /// Scheme as written before `://`.
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicDomain::Persistent => "persistent",
            TopicDomain::NonPersistent => "non-persistent",
        }
    }

    fn from_scheme(scheme: &str) -> TopicNameResult<Self> {
        match scheme {
            "persistent" => Ok(TopicDomain::Persistent),
            "non-persistent" => Ok(TopicDomain::NonPersistent),
            other => Err(TopicNameError::InvalidDomain {
                domain: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for TopicDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured decomposition of a topic string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicName {
    /// Persistence scheme.
    pub domain: TopicDomain,
    /// Owning tenant.
    pub tenant: String,
    /// Cluster segment of legacy four-part names.
    pub cluster: Option<String>,
    /// Namespace within the tenant.
    pub namespace: String,
    /// Last path segment, including any partition suffix.
    pub local_name: String,
    /// Partition index, `-1` when the name is not a partition.
    pub partition: i32,
}

impl TopicName {
    /// Parse a topic string in any of the accepted forms.
    pub fn parse(topic: &str) -> TopicNameResult<Self> {
        if topic.is_empty() {
            return Err(TopicNameError::Empty);
        }

        let qualified = if topic.contains("://") {
            topic.to_string()
        } else {
            match topic.split('/').count() {
                1 => format!(
                    "{}://{}/{}/{}",
                    TopicDomain::Persistent,
                    PUBLIC_TENANT,
                    DEFAULT_NAMESPACE,
                    topic
                ),
                3 | 4 => format!("{}://{}", TopicDomain::Persistent, topic),
                _ => {
                    return Err(TopicNameError::InvalidShortName {
                        topic: topic.to_string(),
                    })
                }
            }
        };

        let Some((scheme, rest)) = qualified.split_once("://") else {
            return Err(TopicNameError::InvalidName {
                topic: topic.to_string(),
            });
        };
        let domain = TopicDomain::from_scheme(scheme)?;

        let parts: Vec<&str> = rest.splitn(4, '/').collect();
        let (tenant, cluster, namespace, local_name) = match parts.as_slice() {
            [tenant, namespace, local] => (*tenant, None, *namespace, *local),
            [tenant, cluster, namespace, local] => (*tenant, Some(*cluster), *namespace, *local),
            _ => {
                return Err(TopicNameError::InvalidName {
                    topic: topic.to_string(),
                })
            }
        };

        if tenant.is_empty()
            || namespace.is_empty()
            || local_name.is_empty()
            || cluster.is_some_and(str::is_empty)
        {
            return Err(TopicNameError::InvalidName {
                topic: topic.to_string(),
            });
        }

        let partition = partition_index(local_name).ok_or_else(|| {
            TopicNameError::InvalidPartition {
                topic: topic.to_string(),
            }
        })?;

        Ok(Self {
            domain,
            tenant: tenant.to_string(),
            cluster: cluster.map(str::to_string),
            namespace: namespace.to_string(),
            local_name: local_name.to_string(),
            partition,
        })
    }

    /// Short name used to decide whether two topic strings name the same topic.
    ///
    /// The local name with any partition suffix removed, so
    /// `persistent://t/ns/foo-partition-2` and `foo` share the short name `foo`.
    pub fn short_name(&self) -> &str {
        if self.is_partition() {
            if let Some(idx) = self.local_name.rfind(PARTITION_SUFFIX) {
                return &self.local_name[..idx];
            }
        }
        &self.local_name
    }

    /// Whether this name refers to a single partition.
    pub fn is_partition(&self) -> bool {
        self.partition >= 0
    }

    /// `tenant/namespace`, or `tenant/cluster/namespace` for legacy names.
    pub fn namespace_path(&self) -> String {
        match &self.cluster {
            Some(cluster) => format!("{}/{}/{}", self.tenant, cluster, self.namespace),
            None => format!("{}/{}", self.tenant, self.namespace),
        }
    }

    /// Fully qualified name including any partition suffix.
    pub fn full_name(&self) -> String {
        format!(
            "{}://{}/{}",
            self.domain,
            self.namespace_path(),
            self.local_name
        )
    }

    /// Fully qualified name of the partitioned topic this partition belongs to.
    pub fn partitioned_topic_name(&self) -> String {
        format!(
            "{}://{}/{}",
            self.domain,
            self.namespace_path(),
            self.short_name()
        )
    }

    /// Sibling topic in the same namespace, e.g. a retry or dead-letter topic.
    pub fn sibling(&self, local_name: &str) -> String {
        format!("{}://{}/{}", self.domain, self.namespace_path(), local_name)
    }

    /// Whether both names share the same short name.
    pub fn same_short_name(&self, other: &TopicName) -> bool {
        self.short_name() == other.short_name()
    }
}

impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

impl FromStr for TopicName {
    type Err = TopicNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TopicName::parse(s)
    }
}

/// `Some(-1)` without a suffix, `None` when the suffix is malformed.
fn partition_index(local_name: &str) -> Option<i32> {
    match local_name.rfind(PARTITION_SUFFIX) {
        Some(idx) => local_name[idx + PARTITION_SUFFIX.len()..]
            .parse::<i32>()
            .ok()
            .filter(|p| *p >= 0),
        None => Some(-1),
    }
}
