use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, Patch, PatchParams};

use crate::routing::AccountTarget;

/// Field manager identity used for all server-side applies.
pub const FIELD_MANAGER: &str = "automount-controller";

/// Minimal desired state: identity plus the one managed field. Nothing from a
/// previously read copy is carried over, so the apply stays a pure merge of
/// this controller's claim.
fn desired_account(target: &AccountTarget) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(target.name.clone()),
            namespace: Some(target.namespace.clone()),
            ..Default::default()
        },
        automount_service_account_token: Some(false),
        ..Default::default()
    }
}

/// Submits a single forced server-side apply setting
/// `automountServiceAccountToken: false`. No resource version is sent, so a
/// stale read can never cause a conflict and the same call is safe to retry
/// verbatim. Retry policy belongs to the caller.
pub async fn disable_automount(
    api: &Api<ServiceAccount>,
    target: &AccountTarget,
) -> Result<ServiceAccount, kube::Error> {
    let params = PatchParams::apply(FIELD_MANAGER).force();
    api.patch(&target.name, &params, &Patch::Apply(&desired_account(target)))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn desired_state_carries_only_identity_and_managed_field() {
        let account = desired_account(&AccountTarget::default_account("team-a"));
        assert_eq!(
            serde_json::to_value(&account).unwrap(),
            json!({
                "apiVersion": "v1",
                "kind": "ServiceAccount",
                "metadata": {
                    "name": "default",
                    "namespace": "team-a",
                },
                "automountServiceAccountToken": false,
            })
        );
    }
}
