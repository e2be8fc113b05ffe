use super::*;
use std::time::Duration;

use crate::{
    fake_service::{cut_tree, fine_tune_result, sample_tree, Call, Failure, FakeService},
    notify::{Notification, NotificationKind},
};
use shared::tree::TreeError;
use tokio::sync::broadcast::error::TryRecvError;

async fn editing(tree: DecisionTree) -> (Arc<FakeService>, Arc<EditController>) {
    let fake = FakeService::serving(Some(tree.clone()));
    let controller = EditController::new(
        fake.clone(),
        SessionId("session-under-test".into()),
        LayoutOptions::default(),
    );
    controller.replace_tree(tree).await.expect("valid tree");
    (fake, Arc::new(controller))
}

fn drain(rx: &mut broadcast::Receiver<EditorEvent>) -> Vec<EditorEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => return events,
        }
    }
}

fn notifications(events: &[EditorEvent]) -> Vec<Notification> {
    events
        .iter()
        .filter_map(|event| match event {
            EditorEvent::Notification(note) => Some(note.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn click_toggles_selection_on_split_nodes() {
    let (_, controller) = editing(sample_tree()).await;

    assert_eq!(controller.click_node(NodeId(1)).await, Phase::Selected(NodeId(1)));
    assert_eq!(controller.click_node(NodeId(0)).await, Phase::Selected(NodeId(0)));
    assert_eq!(controller.click_node(NodeId(0)).await, Phase::Idle);
}

#[tokio::test]
async fn leaf_and_unknown_clicks_change_nothing() {
    let (_, controller) = editing(sample_tree()).await;

    assert_eq!(controller.click_node(NodeId(2)).await, Phase::Idle);
    controller.select(NodeId(1)).await;
    assert_eq!(controller.click_node(NodeId(3)).await, Phase::Selected(NodeId(1)));
    assert_eq!(controller.click_node(NodeId(99)).await, Phase::Selected(NodeId(1)));
}

#[tokio::test]
async fn background_click_clears_selection() {
    let (_, controller) = editing(sample_tree()).await;
    let mut rx = controller.subscribe();

    controller.select(NodeId(0)).await;
    assert_eq!(controller.select(NodeId(0)).await, Phase::Selected(NodeId(0)));
    assert_eq!(controller.click_background().await, Phase::Idle);

    let events = drain(&mut rx);
    assert!(matches!(
        events.as_slice(),
        [
            EditorEvent::SelectionChanged(Some(NodeId(0))),
            EditorEvent::SelectionChanged(None)
        ]
    ));
}

#[tokio::test]
async fn replacing_the_tree_always_clears_selection() {
    let (_, controller) = editing(sample_tree()).await;
    controller.select(NodeId(1)).await;

    controller.replace_tree(sample_tree()).await.expect("replace");
    assert_eq!(controller.selection().await, None);
    assert_eq!(controller.phase().await, Phase::Idle);
}

#[tokio::test]
async fn replace_tree_rejects_malformed_snapshot() {
    let (_, controller) = editing(sample_tree()).await;
    let mut broken = sample_tree();
    if let Some(right) = broken.root.right.as_deref_mut() {
        right.depth = 4;
    }

    let err = controller.replace_tree(broken).await.expect_err("depth mismatch");
    assert!(matches!(err, EditorError::InvalidTree(TreeError::DepthMismatch { .. })));
    assert_eq!(controller.tree().await.as_deref(), Some(&sample_tree()));
}

#[tokio::test]
async fn cut_adopts_refetched_tree_and_clears_selection() {
    let (fake, controller) = editing(sample_tree()).await;
    fake.then_serve(Some(cut_tree()));
    controller.select(NodeId(1)).await;
    let mut rx = controller.subscribe();

    controller.cut(CutDirection::Left).await.expect("cut");

    assert_eq!(fake.calls(), vec![Call::Cut(NodeId(1), CutDirection::Left)]);
    let tree = controller.tree().await.expect("tree");
    assert_eq!(*tree, cut_tree());
    assert!(tree.find(NodeId(1)).is_some_and(DecisionNode::is_leaf));
    assert_eq!(controller.phase().await, Phase::Idle);

    let events = drain(&mut rx);
    assert!(matches!(events.first(), Some(EditorEvent::WorkingChanged(true))));
    assert!(events
        .iter()
        .any(|e| matches!(e, EditorEvent::TreeReplaced { node_count: 3 })));
    assert!(events
        .iter()
        .any(|e| matches!(e, EditorEvent::SelectionChanged(None))));
    assert!(matches!(events.last(), Some(EditorEvent::WorkingChanged(false))));
}

#[tokio::test]
async fn cut_without_selection_is_a_precondition_error() {
    let (fake, controller) = editing(sample_tree()).await;
    let mut rx = controller.subscribe();

    let err = controller.cut(CutDirection::Auto).await.expect_err("no selection");
    assert!(matches!(err, EditorError::Precondition(_)));
    assert!(fake.calls().is_empty());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn retrain_sends_selected_node() {
    let (fake, controller) = editing(sample_tree()).await;
    controller.select(NodeId(0)).await;

    let result = controller.retrain().await.expect("retrain");
    assert!(result.dt_evaluation.is_some());
    assert_eq!(fake.calls(), vec![Call::Retrain(NodeId(0))]);
    assert_eq!(controller.selection().await, None);
}

#[tokio::test]
async fn transport_failure_keeps_tree_and_clears_selection() {
    let (fake, controller) = editing(sample_tree()).await;
    fake.then_serve(Some(cut_tree()));
    fake.fail_next(Failure::Transport);
    controller.select(NodeId(1)).await;
    let mut rx = controller.subscribe();

    let err = controller.cut(CutDirection::Right).await.expect_err("transport");
    assert!(matches!(err, EditorError::Service(ClientError::Transport(_))));
    assert_eq!(controller.tree().await.as_deref(), Some(&sample_tree()));
    assert_eq!(controller.phase().await, Phase::Idle);

    let notes = notifications(&drain(&mut rx));
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].kind(), NotificationKind::Transport);
    assert_eq!(notes[0].operation(), Operation::Cut);
}

#[tokio::test]
async fn server_failure_surfaces_status_and_message() {
    let (fake, controller) = editing(sample_tree()).await;
    fake.fail_next(Failure::Server(500, "node 1 cannot be retrained"));
    controller.select(NodeId(1)).await;
    let mut rx = controller.subscribe();

    controller.retrain().await.expect_err("server failure");

    let notes = notifications(&drain(&mut rx));
    assert_eq!(notes[0].title(), "Status 500");
    assert_eq!(notes[0].description(), Some("node 1 cannot be retrained"));
}

#[tokio::test]
async fn malformed_refetch_is_a_contract_violation() {
    let (fake, controller) = editing(sample_tree()).await;
    let mut broken = cut_tree();
    if let Some(node) = broken.root.left.as_deref_mut() {
        node.output = None;
    }
    fake.then_serve(Some(broken));
    controller.select(NodeId(1)).await;
    let mut rx = controller.subscribe();

    let err = controller.cut(CutDirection::Auto).await.expect_err("invalid tree");
    assert!(matches!(
        err,
        EditorError::InvalidTree(TreeError::MissingOutputAndSplit { node_id: NodeId(1) })
    ));
    assert_eq!(controller.tree().await.as_deref(), Some(&sample_tree()));
    let notes = notifications(&drain(&mut rx));
    assert!(notes[0].is_contract_violation());
}

#[tokio::test]
async fn refetch_transport_failure_after_cut_keeps_previous_tree() {
    let (fake, controller) = editing(sample_tree()).await;
    fake.then_serve(Some(cut_tree()));
    fake.fail_next_fetch(Failure::Transport);
    controller.select(NodeId(1)).await;
    let mut rx = controller.subscribe();

    let err = controller.cut(CutDirection::Left).await.expect_err("refetch failed");
    assert!(matches!(err, EditorError::Service(ClientError::Transport(_))));
    assert_eq!(controller.tree().await.as_deref(), Some(&sample_tree()));
    assert_eq!(controller.phase().await, Phase::Idle);
    assert_eq!(fake.calls(), vec![Call::Cut(NodeId(1), CutDirection::Left)]);

    let events = drain(&mut rx);
    assert!(!events
        .iter()
        .any(|event| matches!(event, EditorEvent::TreeReplaced { .. })));
    let notes = notifications(&events);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].kind(), NotificationKind::Transport);
    assert_eq!(notes[0].operation(), Operation::Cut);
}

#[tokio::test]
async fn refetch_server_failure_after_retrain_is_reported() {
    let (fake, controller) = editing(sample_tree()).await;
    fake.fail_next_fetch(Failure::Server(400, "Invalid JSON in file"));
    controller.select(NodeId(0)).await;
    let mut rx = controller.subscribe();

    controller.retrain().await.expect_err("refetch failed");
    assert_eq!(controller.tree().await.as_deref(), Some(&sample_tree()));
    assert_eq!(controller.phase().await, Phase::Idle);

    let notes = notifications(&drain(&mut rx));
    assert_eq!(notes[0].kind(), NotificationKind::ServerFailure);
    assert_eq!(notes[0].description(), Some("Invalid JSON in file"));
}

#[tokio::test]
async fn missing_tree_after_success_is_reported() {
    let (fake, controller) = editing(sample_tree()).await;
    fake.then_serve(None);
    controller.select(NodeId(0)).await;

    let err = controller.retrain().await.expect_err("no tree");
    assert!(matches!(err, EditorError::MissingTree(Operation::Retrain)));
    assert!(controller.tree().await.is_some());
}

#[tokio::test]
async fn fine_tune_leaves_tree_until_confirm() {
    let (fake, controller) = editing(sample_tree()).await;
    fake.then_serve(Some(cut_tree()));
    controller.select(NodeId(1)).await;
    let before = controller.tree().await.expect("tree");

    let result = controller
        .fine_tune(&FineTuneParams::default())
        .await
        .expect("fine-tune");
    assert_eq!(result, fine_tune_result());
    assert_eq!(controller.pending_fine_tune().await, Some(result));
    assert_eq!(controller.selection().await, None);
    let during = controller.tree().await.expect("tree");
    assert!(Arc::ptr_eq(&before, &during));

    controller.select(NodeId(1)).await;
    assert!(matches!(
        controller.cut(CutDirection::Auto).await,
        Err(EditorError::Precondition(_))
    ));

    controller
        .confirm(&DistillParams::default().with_model(ModelToUse::Original))
        .await
        .expect("confirm");
    assert_eq!(
        fake.calls(),
        vec![Call::FineTune, Call::Distill(ModelToUse::Latest)]
    );
    assert_eq!(controller.pending_fine_tune().await, None);
    assert_eq!(controller.tree().await.as_deref(), Some(&cut_tree()));
}

#[tokio::test]
async fn revert_distills_from_the_original_network() {
    let (fake, controller) = editing(sample_tree()).await;
    controller
        .fine_tune(&FineTuneParams::default())
        .await
        .expect("fine-tune");

    controller
        .revert(&DistillParams::default())
        .await
        .expect("revert");
    assert_eq!(
        fake.calls(),
        vec![Call::FineTune, Call::Distill(ModelToUse::Original)]
    );
    assert_eq!(controller.pending_fine_tune().await, None);
}

#[tokio::test]
async fn confirm_without_pending_fine_tune_is_rejected() {
    let (fake, controller) = editing(sample_tree()).await;

    assert!(matches!(
        controller.confirm(&DistillParams::default()).await,
        Err(EditorError::Precondition(_))
    ));
    assert!(matches!(
        controller.revert(&DistillParams::default()).await,
        Err(EditorError::Precondition(_))
    ));
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn failed_confirm_keeps_the_decision_pending() {
    let (fake, controller) = editing(sample_tree()).await;
    controller
        .fine_tune(&FineTuneParams::default())
        .await
        .expect("fine-tune");
    fake.fail_next(Failure::Decode);

    controller
        .confirm(&DistillParams::default())
        .await
        .expect_err("decode failure");
    assert!(controller.pending_fine_tune().await.is_some());
}

#[tokio::test]
async fn second_intent_is_rejected_while_working() {
    let (fake, controller) = editing(sample_tree()).await;
    fake.then_serve(Some(cut_tree()));
    let release = fake.hold_next();
    controller.select(NodeId(1)).await;

    let worker = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.cut(CutDirection::Left).await })
    };
    tokio::time::timeout(Duration::from_secs(5), fake.entered.notified())
        .await
        .expect("service call started");

    assert!(controller.is_working());
    assert_eq!(controller.phase().await, Phase::Working);
    assert_eq!(controller.click_node(NodeId(0)).await, Phase::Working);
    assert_eq!(controller.click_background().await, Phase::Working);
    assert!(matches!(
        controller.distill(&DistillParams::default()).await,
        Err(EditorError::Busy)
    ));

    release.send(()).expect("release");
    worker.await.expect("join").expect("cut");
    assert!(!controller.is_working());
    assert_eq!(controller.phase().await, Phase::Idle);
    assert_eq!(fake.calls(), vec![Call::Cut(NodeId(1), CutDirection::Left)]);
}

#[tokio::test]
async fn diagram_reflects_selection() {
    let (_, controller) = editing(sample_tree()).await;
    controller.select(NodeId(1)).await;

    let diagram = controller.diagram().await.expect("layout").expect("tree");
    assert_eq!(diagram.nodes.len(), 5);
    assert!(diagram.node(NodeId(1)).is_some_and(|n| n.selected));
    assert_eq!(
        diagram.node(NodeId(1)).map(|n| n.label.as_str()),
        Some("gender = female")
    );
}

#[tokio::test]
async fn no_tree_means_no_diagram() {
    let controller = EditController::new(
        FakeService::serving(None),
        SessionId("empty".into()),
        LayoutOptions::default(),
    );
    assert_eq!(controller.diagram().await, Ok(None));
    assert_eq!(controller.click_node(NodeId(0)).await, Phase::Idle);
    assert!(matches!(
        controller.fine_tune(&FineTuneParams::default()).await,
        Err(EditorError::Precondition(_))
    ));
}
