//! Deployment lifecycle state machine

use crate::models::deployment::{Deployment, DeploymentStatus};

/// Lifecycle event
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// Control plane accepted the create call
    Provisioned,

    /// Instance reported active with a public address
    AddressAssigned(String),

    /// Completion sentinel observed; URL present when one was extracted
    InstallCompleted { service_url: Option<String> },

    /// An attempt budget ran out
    AttemptsExhausted(String),

    /// Control plane reported the instance failed
    InstanceFailed(String),
}

/// Apply an event to a deployment record and transition its status.
/// Terminal states reject every event; invalid pairs leave the record
/// untouched.
pub fn apply(deployment: &mut Deployment, event: LifecycleEvent) -> Result<(), String> {
    let new_status = match (&deployment.status, &event) {
        // From Creating
        (DeploymentStatus::Creating, LifecycleEvent::Provisioned) => {
            DeploymentStatus::NetworkPending
        }

        // From NetworkPending
        (DeploymentStatus::NetworkPending, LifecycleEvent::AddressAssigned(ip)) => {
            deployment.ip = Some(ip.clone());
            DeploymentStatus::Installing
        }

        // From Installing
        (DeploymentStatus::Installing, LifecycleEvent::InstallCompleted { service_url }) => {
            deployment.service_url = service_url.clone();
            DeploymentStatus::Ready
        }

        // Budget exhaustion, from either polling phase
        (
            DeploymentStatus::NetworkPending | DeploymentStatus::Installing,
            LifecycleEvent::AttemptsExhausted(reason),
        ) => {
            deployment.error = Some(reason.clone());
            DeploymentStatus::Timeout
        }

        // Control-plane reported instance failure, from either polling phase
        (
            DeploymentStatus::NetworkPending | DeploymentStatus::Installing,
            LifecycleEvent::InstanceFailed(reason),
        ) => {
            deployment.error = Some(reason.clone());
            DeploymentStatus::Error
        }

        // Invalid transitions
        (status, event) => {
            return Err(format!("Invalid transition: {:?} -> {:?}", status, event));
        }
    };

    deployment.status = new_status;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record() -> Deployment {
        Deployment::new("42", Utc::now(), None)
    }

    #[test]
    fn test_success_path() {
        let mut deployment = record();
        assert_eq!(deployment.status, DeploymentStatus::Creating);

        apply(&mut deployment, LifecycleEvent::Provisioned).unwrap();
        assert_eq!(deployment.status, DeploymentStatus::NetworkPending);
        assert!(deployment.ip.is_none());

        apply(&mut deployment, LifecycleEvent::AddressAssigned("10.0.0.5".to_string())).unwrap();
        assert_eq!(deployment.status, DeploymentStatus::Installing);
        assert_eq!(deployment.ip.as_deref(), Some("10.0.0.5"));
        assert!(deployment.service_url.is_none());

        apply(
            &mut deployment,
            LifecycleEvent::InstallCompleted {
                service_url: Some("https://abc123.example".to_string()),
            },
        )
        .unwrap();
        assert_eq!(deployment.status, DeploymentStatus::Ready);
        assert_eq!(deployment.service_url.as_deref(), Some("https://abc123.example"));
        assert!(deployment.status.is_terminal());
    }

    #[test]
    fn test_degraded_completion_without_url() {
        let mut deployment = record();
        apply(&mut deployment, LifecycleEvent::Provisioned).unwrap();
        apply(&mut deployment, LifecycleEvent::AddressAssigned("10.0.0.5".to_string())).unwrap();

        apply(&mut deployment, LifecycleEvent::InstallCompleted { service_url: None }).unwrap();

        assert_eq!(deployment.status, DeploymentStatus::Ready);
        assert!(deployment.service_url.is_none());
    }

    #[test]
    fn test_timeout_from_both_phases() {
        let mut deployment = record();
        apply(&mut deployment, LifecycleEvent::Provisioned).unwrap();
        apply(&mut deployment, LifecycleEvent::AttemptsExhausted("no address".to_string()))
            .unwrap();
        assert_eq!(deployment.status, DeploymentStatus::Timeout);
        assert_eq!(deployment.error.as_deref(), Some("no address"));

        let mut deployment = record();
        apply(&mut deployment, LifecycleEvent::Provisioned).unwrap();
        apply(&mut deployment, LifecycleEvent::AddressAssigned("10.0.0.5".to_string())).unwrap();
        apply(&mut deployment, LifecycleEvent::AttemptsExhausted("no sentinel".to_string()))
            .unwrap();
        assert_eq!(deployment.status, DeploymentStatus::Timeout);
    }

    #[test]
    fn test_terminal_states_reject_events() {
        let mut deployment = record();
        apply(&mut deployment, LifecycleEvent::Provisioned).unwrap();
        apply(&mut deployment, LifecycleEvent::AttemptsExhausted("no address".to_string()))
            .unwrap();

        let result = apply(
            &mut deployment,
            LifecycleEvent::AddressAssigned("10.0.0.5".to_string()),
        );
        assert!(result.is_err());
        assert_eq!(deployment.status, DeploymentStatus::Timeout);
        assert!(deployment.ip.is_none());
    }

    #[test]
    fn test_url_requires_install_milestone() {
        let mut deployment = record();

        let result = apply(&mut deployment, LifecycleEvent::InstallCompleted { service_url: None });
        assert!(result.is_err());
        assert_eq!(deployment.status, DeploymentStatus::Creating);

        apply(&mut deployment, LifecycleEvent::Provisioned).unwrap();
        let result = apply(
            &mut deployment,
            LifecycleEvent::InstallCompleted {
                service_url: Some("https://abc123.example".to_string()),
            },
        );
        assert!(result.is_err());
        assert!(deployment.service_url.is_none());
    }

    #[test]
    fn test_instance_failure_is_terminal_error() {
        let mut deployment = record();
        apply(&mut deployment, LifecycleEvent::Provisioned).unwrap();
        apply(&mut deployment, LifecycleEvent::InstanceFailed("kernel panic".to_string()))
            .unwrap();

        assert_eq!(deployment.status, DeploymentStatus::Error);
        assert!(deployment.status.is_terminal());
        assert!(apply(&mut deployment, LifecycleEvent::Provisioned).is_err());
    }
}
