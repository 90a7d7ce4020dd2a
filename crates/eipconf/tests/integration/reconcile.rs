//! Full reconciliation passes against a fake host.

use std::sync::Arc;

use eipconf::daemon::Reconciler;
use eipconf::notify::NotifyLevel;
use eipconf::reconcile::ApplyOptions;
use eipconf::resolve::SourceDefaults;
use serde_json::json;

use crate::common::{Captured, Document, FakeHost, FakeResolver, ifconfig, ip};

fn reconciler(
    host: &FakeHost,
    doc: &Document,
    notifier: &Captured,
) -> Reconciler<FakeHost, FakeResolver> {
    Reconciler::new(
        ifconfig(host),
        FakeResolver::new(),
        doc.fetcher(),
        "em2",
        SourceDefaults::default(),
        Arc::new(notifier.clone()),
    )
    .host("gw1")
}

fn one_tunnel(description: &str) -> serde_json::Value {
    json!([{
        "tunnel_id": "1",
        "src_addr": "192.0.2.1",
        "dst_addr": "198.51.100.7",
        "vlan_id": "101",
        "description": description
    }])
}

/// gif1, em2.101 and bridge1 as a previous pass would have left them.
fn converged_host(description: &str) -> FakeHost {
    FakeHost::new()
        .nic("em2", &[])
        .tunnel("gif1", "192.0.2.1", "198.51.100.7", description)
        .vlan("em2.101", 101, "em2")
        .bridge("bridge1", &["em2.101", "gif1"])
}

#[tokio::test]
async fn test_create_from_empty_host() {
    let host = FakeHost::new().nic("em2", &[]);
    let doc = Document::new(one_tunnel("tokyo office"));
    let notifier = Captured::default();

    let report = reconciler(&host, &doc, &notifier)
        .run_pass(ApplyOptions::default())
        .await
        .unwrap();

    assert!(report.result.is_success());
    assert_eq!(
        host.mutations(),
        vec![
            "gif1 create",
            "gif1 tunnel 192.0.2.1 198.51.100.7",
            "gif1 mtu 1500",
            "gif1 link0",
            "gif1 up",
            "gif1 description tokyo office",
            "em2.101 create",
            "em2.101 vlan 101 vlandev em2 up",
            "bridge1 create",
            "bridge1 addm gif1",
            "bridge1 addm em2.101",
            "bridge1 mtu 1500",
            "bridge1 up",
        ]
    );
    assert_eq!(report.result.commands_issued, 13);

    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, NotifyLevel::Info);
    assert!(messages[0].1.starts_with("Configuration updated on gw1:\nAdded tunnels:\n"));
    assert!(messages[0].1.contains("tunnel_id=`1`"));
}

#[tokio::test]
async fn test_second_pass_is_idempotent() {
    let host = FakeHost::new().nic("em2", &[]);
    let doc = Document::new(one_tunnel("tokyo office"));
    let notifier = Captured::default();
    let reconciler = reconciler(&host, &doc, &notifier);

    reconciler.run_pass(ApplyOptions::default()).await.unwrap();
    host.clear_log();

    let report = reconciler.run_pass(ApplyOptions::default()).await.unwrap();

    assert!(report.plan.is_empty());
    assert!(host.mutations().is_empty());
    assert_eq!(report.result.summary_text(), "No changes made");
    assert_eq!(notifier.messages().len(), 1);
}

#[tokio::test]
async fn test_description_compared_trimmed() {
    let host = converged_host("tokyo office");
    let doc = Document::new(one_tunnel("  tokyo office  "));

    let report = reconciler(&host, &doc, &Captured::default())
        .run_pass(ApplyOptions::default())
        .await
        .unwrap();

    assert!(report.plan.is_empty());
    assert!(host.mutations().is_empty());
}

#[tokio::test]
async fn test_description_update_and_clear() {
    let host = converged_host("old name");
    let doc = Document::new(one_tunnel("new name"));
    let notifier = Captured::default();
    let reconciler = reconciler(&host, &doc, &notifier);

    reconciler.run_pass(ApplyOptions::default()).await.unwrap();
    assert_eq!(host.mutations(), vec!["gif1 description new name"]);
    assert!(notifier.messages()[0].1.contains("Modified tunnels:"));

    host.clear_log();
    doc.replace(one_tunnel(""));
    reconciler.run_pass(ApplyOptions::default()).await.unwrap();
    assert_eq!(host.mutations(), vec!["gif1 -description"]);
    assert_eq!(host.iface("gif1").unwrap().description, "");
}

#[tokio::test]
async fn test_endpoint_change_reconfigures_in_place() {
    let host = converged_host("");
    let doc = Document::new(json!([{
        "tunnel_id": "1",
        "src_addr": "192.0.2.1",
        "dst_addr": "198.51.100.99",
        "vlan_id": "101"
    }]));

    reconciler(&host, &doc, &Captured::default())
        .run_pass(ApplyOptions::default())
        .await
        .unwrap();

    assert_eq!(
        host.mutations(),
        vec![
            "gif1 tunnel 192.0.2.1 198.51.100.99",
            "gif1 link0",
            "gif1 up",
        ]
    );
    assert_eq!(
        host.iface("gif1").unwrap().tunnel,
        Some((ip("192.0.2.1"), ip("198.51.100.99")))
    );
}

#[tokio::test]
async fn test_unlisted_tunnels_are_removed() {
    let host = converged_host("")
        .tunnel("gif2", "192.0.2.1", "198.51.100.8", "")
        .vlan("em2.102", 102, "em2")
        .bridge("bridge2", &["gif2", "em2.102"])
        .vlan("em3.5", 5, "em3");
    let doc = Document::new(one_tunnel(""));
    let notifier = Captured::default();

    reconciler(&host, &doc, &notifier)
        .run_pass(ApplyOptions::default())
        .await
        .unwrap();

    assert_eq!(
        host.mutations(),
        vec!["gif2 destroy", "bridge2 destroy", "em2.102 destroy"]
    );
    assert!(host.exists("em3.5"));
    assert!(host.exists("gif1"));

    let message = &notifier.messages()[0].1;
    assert!(message.contains(
        "Removed tunnels:\n- tunnel_id=`2`, src_addr=`192.0.2.1`, dst_addr=`198.51.100.8`"
    ));
    assert!(message.contains("Removed bridges:\n- bridge2"));
}

#[tokio::test]
async fn test_bridge_membership_order_is_ignored() {
    let host = FakeHost::new()
        .nic("em2", &[])
        .tunnel("gif1", "192.0.2.1", "198.51.100.7", "")
        .vlan("em2.101", 101, "em2")
        .bridge("bridge1", &["gif1", "em2.101"]);
    let doc = Document::new(one_tunnel(""));

    let report = reconciler(&host, &doc, &Captured::default())
        .run_pass(ApplyOptions::default())
        .await
        .unwrap();

    assert!(report.plan.is_empty());
    assert!(host.mutations().is_empty());
}

#[tokio::test]
async fn test_wrong_bridge_membership_is_rebuilt() {
    let host = FakeHost::new()
        .nic("em2", &[])
        .tunnel("gif1", "192.0.2.1", "198.51.100.7", "")
        .vlan("em2.101", 101, "em2")
        .bridge("bridge1", &["gif1"]);
    let doc = Document::new(one_tunnel(""));

    reconciler(&host, &doc, &Captured::default())
        .run_pass(ApplyOptions::default())
        .await
        .unwrap();

    assert_eq!(
        host.mutations(),
        vec![
            "bridge1 destroy",
            "bridge1 create",
            "bridge1 addm gif1",
            "bridge1 addm em2.101",
            "bridge1 up",
        ]
    );
}

#[tokio::test]
async fn test_wrong_vlan_tag_converges_in_one_pass() {
    let host = FakeHost::new()
        .nic("em2", &[])
        .tunnel("gif1", "192.0.2.1", "198.51.100.7", "")
        .vlan("em2.101", 999, "em2")
        .bridge("bridge1", &["gif1", "em2.101"]);
    let doc = Document::new(one_tunnel(""));
    let reconciler = reconciler(&host, &doc, &Captured::default());

    reconciler.run_pass(ApplyOptions::default()).await.unwrap();
    assert_eq!(
        host.mutations(),
        vec![
            "em2.101 destroy",
            "em2.101 create",
            "em2.101 vlan 101 vlandev em2 up",
            "bridge1 destroy",
            "bridge1 create",
            "bridge1 addm gif1",
            "bridge1 addm em2.101",
            "bridge1 up",
        ]
    );
    assert_eq!(host.iface("em2.101").unwrap().vlan, Some((101, "em2".to_string())));
    assert_eq!(host.iface("bridge1").unwrap().members, vec!["gif1", "em2.101"]);

    host.clear_log();
    let report = reconciler.run_pass(ApplyOptions::default()).await.unwrap();
    assert!(report.plan.is_empty());
    assert!(host.mutations().is_empty());
}

#[tokio::test]
async fn test_interface_vanishing_mid_snapshot_is_skipped() {
    let host = converged_host("")
        .tunnel("gif2", "192.0.2.1", "198.51.100.8", "")
        .vlan("em2.102", 102, "em2")
        .bridge("bridge2", &["gif2", "em2.102"]);
    host.vanish_after_listing("gif2");
    host.vanish_after_listing("em2.102");
    let doc = Document::new(one_tunnel(""));

    let report = reconciler(&host, &doc, &Captured::default())
        .run_pass(ApplyOptions::default())
        .await
        .unwrap();

    assert!(report.result.is_success());
    assert!(host.queries().contains(&"gif2".to_string()));
    assert_eq!(host.mutations(), vec!["bridge2 destroy"]);
    assert!(host.exists("gif1"));
}

#[tokio::test]
async fn test_failed_tunnel_skips_rest_of_entry() {
    let host = FakeHost::new().nic("em2", &[]);
    host.fail_on("gif1 tunnel 192.0.2.1 198.51.100.7");
    let doc = Document::new(json!([
        {"tunnel_id": "1", "src_addr": "192.0.2.1", "dst_addr": "198.51.100.7", "vlan_id": "101"},
        {"tunnel_id": "2", "src_addr": "192.0.2.1", "dst_addr": "198.51.100.8", "vlan_id": "102"}
    ]));

    let report = reconciler(&host, &doc, &Captured::default())
        .run_pass(ApplyOptions::default())
        .await
        .unwrap();

    assert!(!report.result.is_success());
    assert_eq!(report.result.errors.len(), 1);
    assert!(report.result.errors[0].operation.starts_with("set tunnel gif1"));
    assert!(!host.exists("em2.101"));
    assert!(!host.exists("bridge1"));
    assert!(host.exists("bridge2"));
    assert_eq!(host.iface("bridge2").unwrap().members, vec!["gif2", "em2.102"]);
}

#[tokio::test]
async fn test_failed_description_does_not_abort() {
    let host = FakeHost::new().nic("em2", &[]);
    host.fail_on("gif1 description tokyo office");
    let doc = Document::new(one_tunnel("tokyo office"));

    let report = reconciler(&host, &doc, &Captured::default())
        .run_pass(ApplyOptions::default())
        .await
        .unwrap();

    assert_eq!(report.result.errors.len(), 1);
    assert!(host.exists("bridge1"));
}

#[tokio::test]
async fn test_dry_run_changes_nothing() {
    let host = FakeHost::new().nic("em2", &[]);
    let doc = Document::new(one_tunnel(""));
    let notifier = Captured::default();

    let report = reconciler(&host, &doc, &notifier)
        .run_pass(ApplyOptions {
            dry_run: true,
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(host.mutations().is_empty());
    assert!(notifier.messages().is_empty());
    assert_eq!(report.result.summary[0], "Would create gif1");
    assert!(report.plan.summary().contains("+ tunnel gif1 (192.0.2.1 -> 198.51.100.7)"));
}

#[tokio::test]
async fn test_rejected_entries_are_counted() {
    let host = FakeHost::new().nic("em2", &[]);
    let doc = Document::new(json!([
        {"tunnel_id": "1", "src_addr": "192.0.2.1", "dst_addr": "198.51.100.7", "vlan_id": "101"},
        {"tunnel_id": "2", "src_addr": "192.0.2.1", "dst_addr": "198.51.100.7", "vlan_id": "102"}
    ]));

    let report = reconciler(&host, &doc, &Captured::default())
        .run_pass(ApplyOptions::default())
        .await
        .unwrap();

    assert_eq!(report.accepted, 1);
    assert_eq!(report.rejected, 1);
    assert!(!host.exists("gif2"));
}

#[tokio::test]
async fn test_document_must_be_array() {
    let host = FakeHost::new().nic("em2", &[]);
    let doc = Document::new(json!({"tunnel_id": "1"}));

    let err = reconciler(&host, &doc, &Captured::default())
        .run_pass(ApplyOptions::default())
        .await
        .unwrap_err();

    assert!(err.is_fetch_failure());
    assert!(err.to_string().contains("expected a JSON array of tunnels"));
    assert!(host.mutations().is_empty());
}
