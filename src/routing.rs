use k8s_openapi::api::core::v1::{Namespace, ServiceAccount};
use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;

/// The only service account name this controller ever acts on.
pub const DEFAULT_SERVICE_ACCOUNT: &str = "default";

/// Identity of the one account to reconcile in a namespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountTarget {
    pub namespace: String,
    pub name: String,
}

impl AccountTarget {
    pub fn default_account(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: DEFAULT_SERVICE_ACCOUNT.to_string(),
        }
    }
}

/// A namespace appearing implies a pending default account, even before the
/// control plane has provisioned it.
pub fn target_for_namespace(ns: &Namespace) -> AccountTarget {
    AccountTarget::default_account(&ns.name_any())
}

/// Maps a service account notification back to the namespace whose default
/// account it is. Anything other than the default account is dropped here, so
/// no work is ever queued for it.
pub fn namespace_for_account(account: ServiceAccount) -> Option<ObjectRef<Namespace>> {
    if account.name_any() != DEFAULT_SERVICE_ACCOUNT {
        return None;
    }
    account.namespace().map(|ns| ObjectRef::new(&ns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn namespace(name: &str) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn account(namespace: &str, name: &str) -> ServiceAccount {
        ServiceAccount {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn namespace_event_targets_its_default_account() {
        assert_eq!(
            target_for_namespace(&namespace("team-a")),
            AccountTarget {
                namespace: "team-a".to_string(),
                name: "default".to_string(),
            }
        );
    }

    #[rstest]
    #[case::default_account(account("team-a", "default"), Some("team-a"))]
    #[case::builder_account(account("team-a", "builder"), None)]
    #[case::kube_system_default(account("kube-system", "default"), Some("kube-system"))]
    #[case::missing_namespace(account_without_namespace("default"), None)]
    fn account_event_routing(
        #[case] account: ServiceAccount,
        #[case] expected_namespace: Option<&str>,
    ) {
        let target = namespace_for_account(account);
        assert_eq!(
            target.map(|ns| ns.name),
            expected_namespace.map(String::from)
        );
    }

    fn account_without_namespace(name: &str) -> ServiceAccount {
        ServiceAccount {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
