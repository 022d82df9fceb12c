//! Structure versioning, history, closed terms and deactivation.

mod common;

use chrono::Utc;
use common::{dec, item, one_off_item, Fixture};
use fee_service::models::{CreateStructureVersion, CreationMode, StructureStatus};
use fee_service::FeeError;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn new_version_replaces_previous_for_billing() {
    let fx = Fixture::new().await;
    let class_id = fx.classes[0];
    let created = fx
        .engine
        .create_fee_structure(fx.termly(vec![class_id], 1, "Term 1", vec![item("Tuition", "900")]))
        .await
        .unwrap();
    let v1 = &created.structures[0];

    let v2 = fx
        .engine
        .create_structure_version(CreateStructureVersion {
            structure_id: v1.structure_id,
            structure_name: Some("  Term 1 (revised) ".to_string()),
            items: vec![item("Tuition", "950"), item("Lunch", "100")],
        })
        .await
        .unwrap();

    assert_eq!(v2.lineage_id, v1.lineage_id);
    assert_eq!(v2.version, 2);
    assert_eq!(v2.structure_name, "Term 1 (revised)");
    assert_eq!(v2.class_ids, v1.class_ids);
    assert_eq!(v2.term_id, v1.term_id);

    let items = fx.engine.resolve_line_items(class_id, fx.term_id(1)).await.unwrap();
    let total: rust_decimal::Decimal = items.iter().map(|i| i.amount()).sum();
    assert_eq!(total, dec("1050"));

    let history = fx.engine.structure_history(v1.lineage_id).await.unwrap();
    let versions: Vec<(i32, StructureStatus)> =
        history.iter().map(|s| (s.version, s.status)).collect();
    assert_eq!(
        versions,
        vec![(1, StructureStatus::Inactive), (2, StructureStatus::Active)]
    );
}

#[tokio::test]
async fn only_active_version_can_be_revised() {
    let fx = Fixture::new().await;
    let created = fx
        .engine
        .create_fee_structure(fx.termly(vec![fx.classes[0]], 1, "Term 1", vec![item("Tuition", "900")]))
        .await
        .unwrap();
    let v1_id = created.structures[0].structure_id;

    fx.engine
        .create_structure_version(CreateStructureVersion {
            structure_id: v1_id,
            structure_name: None,
            items: vec![item("Tuition", "950")],
        })
        .await
        .unwrap();

    let err = fx
        .engine
        .create_structure_version(CreateStructureVersion {
            structure_id: v1_id,
            structure_name: None,
            items: vec![item("Tuition", "1000")],
        })
        .await
        .unwrap_err();
    match err {
        FeeError::Validation { field, .. } => assert_eq!(field, "structure_id"),
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[tokio::test]
async fn revision_requires_items() {
    let fx = Fixture::new().await;
    let created = fx
        .engine
        .create_fee_structure(fx.termly(vec![fx.classes[0]], 1, "Term 1", vec![item("Tuition", "900")]))
        .await
        .unwrap();

    let err = fx
        .engine
        .create_structure_version(CreateStructureVersion {
            structure_id: created.structures[0].structure_id,
            structure_name: None,
            items: vec![],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, FeeError::Validation { ref field, .. } if field == "items"));
}

#[tokio::test]
async fn closed_term_keeps_version_current_at_close() {
    let fx = Fixture::new().await;
    let class_id = fx.classes[0];
    let created = fx
        .engine
        .create_fee_structure(fx.termly(vec![class_id], 1, "Term 1", vec![item("Tuition", "900")]))
        .await
        .unwrap();
    let v1 = &created.structures[0];

    fx.close_term(1, v1.created_utc).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    fx.engine
        .create_structure_version(CreateStructureVersion {
            structure_id: v1.structure_id,
            structure_name: None,
            items: vec![item("Tuition", "950")],
        })
        .await
        .unwrap();

    let items = fx.engine.resolve_line_items(class_id, fx.term_id(1)).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].amount(), dec("900"));
}

#[tokio::test]
async fn open_terms_pick_up_year_scoped_revision() {
    let fx = Fixture::new().await;
    let class_id = fx.classes[1];
    let created = fx
        .engine
        .create_fee_structure(fx.request(
            vec![class_id],
            "Admission",
            CreationMode::Annual {
                term1_items: vec![],
                term2_items: vec![],
                term3_items: vec![],
                annual_items: vec![],
                one_off_items: vec![one_off_item("Admission", "250")],
            },
        ))
        .await
        .unwrap();
    let v1 = &created.structures[0];

    fx.close_term(1, Utc::now()).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    fx.engine
        .create_structure_version(CreateStructureVersion {
            structure_id: v1.structure_id,
            structure_name: None,
            items: vec![one_off_item("Admission", "300")],
        })
        .await
        .unwrap();

    let closed = fx.engine.resolve_line_items(class_id, fx.term_id(1)).await.unwrap();
    assert_eq!(closed[0].amount(), dec("250"));
    let open = fx.engine.resolve_line_items(class_id, fx.term_id(2)).await.unwrap();
    assert_eq!(open[0].amount(), dec("300"));
}

#[tokio::test]
async fn deactivated_structure_stops_billing() {
    let fx = Fixture::new().await;
    let class_id = fx.classes[0];
    let created = fx
        .engine
        .create_fee_structure(fx.termly(vec![class_id], 2, "Term 2", vec![item("Tuition", "900")]))
        .await
        .unwrap();
    let structure_id = created.structures[0].structure_id;

    let deactivated = fx.engine.deactivate_structure(structure_id).await.unwrap();
    assert_eq!(deactivated.status, StructureStatus::Inactive);
    assert!(deactivated.deactivated_utc.is_some());

    assert!(fx
        .engine
        .resolve_line_items(class_id, fx.term_id(2))
        .await
        .unwrap()
        .is_empty());

    // the slot is free again
    fx.engine
        .create_fee_structure(fx.termly(vec![class_id], 2, "Term 2 again", vec![item("Tuition", "1")]))
        .await
        .unwrap();
}

#[tokio::test]
async fn unknown_lineage_and_structure_are_not_found() {
    let fx = Fixture::new().await;

    let err = fx.engine.structure_history(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, FeeError::NotFound { .. }));

    let err = fx.engine.get_structure(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, FeeError::NotFound { .. }));

    let err = fx
        .engine
        .create_structure_version(CreateStructureVersion {
            structure_id: Uuid::new_v4(),
            structure_name: None,
            items: vec![item("Tuition", "1")],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, FeeError::NotFound { .. }));
}

#[tokio::test]
async fn deactivating_latest_version_does_not_revive_older_one() {
    let fx = Fixture::new().await;
    let class_id = fx.classes[0];
    let created = fx
        .engine
        .create_fee_structure(fx.termly(vec![class_id], 1, "Term 1", vec![item("Tuition", "900")]))
        .await
        .unwrap();
    let v1 = &created.structures[0];
    let v2 = fx
        .engine
        .create_structure_version(CreateStructureVersion {
            structure_id: v1.structure_id,
            structure_name: None,
            items: vec![item("Tuition", "950")],
        })
        .await
        .unwrap();

    fx.engine.deactivate_structure(v2.structure_id).await.unwrap();

    assert!(fx
        .engine
        .resolve_line_items(class_id, fx.term_id(1))
        .await
        .unwrap()
        .is_empty());
    let v1 = fx.engine.get_structure(v1.structure_id).await.unwrap();
    assert_eq!(v1.status, StructureStatus::Inactive);

    // the cell is free, so a replacement bills alone
    fx.engine
        .create_fee_structure(fx.termly(vec![class_id], 1, "Replacement", vec![item("Tuition", "1000")]))
        .await
        .unwrap();
    let items = fx.engine.resolve_line_items(class_id, fx.term_id(1)).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].amount(), dec("1000"));
}
