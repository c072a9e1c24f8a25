use std::future::Future;
use std::time::Duration;

use crate::core::config::PortletConfig;
use crate::mapping::descriptor::MappingRecord;

/// Deadline applied to one mapping's pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeoutPolicy {
    deadline: Option<Duration>,
}

/// Returned when the deadline passed before the pipeline settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineExceeded {
    pub after: Duration,
}

impl TimeoutPolicy {
    /// A zero duration disables the deadline
    pub fn new(deadline: Option<Duration>) -> Self {
        Self {
            deadline: deadline.filter(|d| !d.is_zero()),
        }
    }

    /// Route `timeout`, falling back to the portlet's `defaultTimeout` when absent or zero
    pub fn for_mapping(mapping: &MappingRecord, portlet: &PortletConfig) -> Self {
        let route = mapping
            .timeout()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);
        Self::new(route.or_else(|| portlet.default_timeout()))
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub fn as_millis(&self) -> Option<u64> {
        self.deadline
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    /// Run `future` under the deadline. The future is dropped when it expires, which
    /// stops polling it but does not cancel work it already spawned elsewhere.
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output, DeadlineExceeded> {
        match self.deadline {
            Some(after) => tokio::time::timeout(after, future)
                .await
                .map_err(|_| DeadlineExceeded { after }),
            None => Ok(future.await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapping(attributes: serde_json::Value) -> MappingRecord {
        MappingRecord {
            attributes: attributes.as_object().cloned().unwrap_or_default(),
            hooks: Default::default(),
        }
    }

    #[test]
    fn test_route_timeout_wins_over_default() {
        let portlet = PortletConfig {
            default_timeout: Some(1000),
            ..Default::default()
        };
        let policy = TimeoutPolicy::for_mapping(&mapping(json!({"timeout": 500})), &portlet);
        assert_eq!(policy.as_millis(), Some(500));

        let policy = TimeoutPolicy::for_mapping(&mapping(json!({"timeout": 0})), &portlet);
        assert_eq!(policy.as_millis(), Some(1000));

        let policy = TimeoutPolicy::for_mapping(&mapping(json!({})), &PortletConfig::default());
        assert_eq!(policy.deadline(), None);
    }

    #[tokio::test]
    async fn test_deadline_expires() {
        let policy = TimeoutPolicy::new(Some(Duration::from_millis(20)));
        let outcome = policy
            .run(tokio::time::sleep(Duration::from_millis(300)))
            .await;
        assert_eq!(
            outcome,
            Err(DeadlineExceeded {
                after: Duration::from_millis(20)
            })
        );

        let outcome = TimeoutPolicy::default().run(async { 7 }).await;
        assert_eq!(outcome, Ok(7));
    }
}
