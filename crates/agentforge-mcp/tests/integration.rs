// SPDX-License-Identifier: Apache-2.0
use agentforge_mcp::{AllowList, FakeMcpClient, McpClient, McpError};
use serde_json::json;

#[tokio::test]
async fn discover_returns_registered_catalogue() {
    let fake = FakeMcpClient::new()
        .with_tool("search", "full text search", json!({"required": ["query"]}), json!({"hits": []}));
    let catalogue = fake.discover().await.unwrap();
    assert!(catalogue.contains("search"));
    assert_eq!(catalogue.names(), vec!["search"]);
}

#[tokio::test]
async fn allow_list_blocks_without_invoking_handler() {
    let called = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let called_clone = called.clone();
    let fake = FakeMcpClient::new().with_tool_fn("shell", "", json!({}), move |_| {
        called_clone.store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(json!({}))
    });
    let allow = AllowList::from_names(["search".to_string()]);
    let result = fake.invoke("shell", json!({}), &allow).await;
    assert!(matches!(result, Err(McpError::ToolDenied(_))));
    assert!(!called.load(std::sync::atomic::Ordering::SeqCst));
}

#[tokio::test]
async fn unknown_tool_is_tool_not_found() {
    let fake = FakeMcpClient::new();
    let result = fake.invoke("does-not-exist", json!({}), &AllowList::unfiltered()).await;
    assert!(matches!(result, Err(McpError::ToolNotFound(_))));
}

#[tokio::test]
async fn tool_execution_error_propagates_from_handler() {
    let fake = FakeMcpClient::new().with_tool_fn("flaky", "", json!({}), |_| {
        Err(McpError::ToolExecutionError("flaky".to_string(), "boom".to_string()))
    });
    let result = fake.invoke("flaky", json!({}), &AllowList::unfiltered()).await;
    match result {
        Err(McpError::ToolExecutionError(name, msg)) => {
            assert_eq!(name, "flaky");
            assert_eq!(msg, "boom");
        }
        other => panic!("expected ToolExecutionError, got {other:?}"),
    }
}

#[tokio::test]
async fn sequential_invocations_are_recorded_in_call_order() {
    let fake = FakeMcpClient::new().with_tool("echo", "", json!({}), json!({"ok": true}));
    for i in 0..3 {
        fake.invoke("echo", json!({"i": i}), &AllowList::unfiltered()).await.unwrap();
    }
    let calls = fake.calls();
    assert_eq!(calls.len(), 3);
    for (i, (name, args)) in calls.iter().enumerate() {
        assert_eq!(name, "echo");
        assert_eq!(args["i"], i);
    }
}
