//! Fee structure creation tests: termly, annual and yearly requests.

mod common;

use common::{annual_item, dec, item, one_off_item, Fixture};
use fee_service::models::{CreationMode, LineItemKind, ListStructuresFilter, StructureScope};
use fee_service::FeeError;
use uuid::Uuid;

fn field_of(err: FeeError) -> String {
    match err {
        FeeError::Validation { field, .. } => field,
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[tokio::test]
async fn termly_request_creates_one_structure() {
    let fx = Fixture::new().await;
    let request = fx.termly(
        vec![fx.classes[0], fx.classes[1]],
        1,
        "Term 1 Fees",
        vec![item("Tuition", "2000.00"), item("Transport", "300.00")],
    );

    let created = fx.engine.create_fee_structure(request).await.unwrap();

    assert_eq!(created.structures.len(), 1);
    assert!(created.overridden.is_empty());
    let structure = &created.structures[0];
    assert_eq!(structure.scope(), StructureScope::Term(fx.term_id(1)));
    assert_eq!(structure.version, 1);
    assert!(structure.is_active());
    assert_eq!(structure.total(), dec("2300.00"));

    for class_id in [fx.classes[0], fx.classes[1]] {
        let items = fx
            .engine
            .resolve_line_items(class_id, fx.term_id(1))
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
    }
    assert!(fx
        .engine
        .resolve_line_items(fx.classes[2], fx.term_id(1))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn annual_request_bills_once_items_in_first_structure() {
    let fx = Fixture::new().await;
    let class_id = fx.classes[0];
    let request = fx.request(
        vec![class_id],
        "2026 Fees",
        CreationMode::Annual {
            term1_items: vec![item("Tuition", "1000.00")],
            term2_items: vec![item("Tuition", "1000.00")],
            term3_items: vec![],
            annual_items: vec![annual_item("Uniform", "500.00")],
            one_off_items: vec![],
        },
    );

    let created = fx.engine.create_fee_structure(request).await.unwrap();
    assert_eq!(created.structures.len(), 2);

    let term1 = fx.engine.resolve_line_items(class_id, fx.term_id(1)).await.unwrap();
    let total: rust_decimal::Decimal = term1.iter().map(|i| i.amount()).sum();
    assert_eq!(total, dec("1500.00"));
    assert!(term1.iter().any(|i| i.kind() == LineItemKind::Annual));

    let term2 = fx.engine.resolve_line_items(class_id, fx.term_id(2)).await.unwrap();
    assert!(term2.iter().all(|i| i.kind() == LineItemKind::Termly));

    assert!(fx
        .engine
        .resolve_line_items(class_id, fx.term_id(3))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn annual_request_with_only_once_items_is_year_scoped() {
    let fx = Fixture::new().await;
    let request = fx.request(
        vec![fx.classes[0]],
        "Admission",
        CreationMode::Annual {
            term1_items: vec![],
            term2_items: vec![],
            term3_items: vec![],
            annual_items: vec![],
            one_off_items: vec![one_off_item("Admission", "250.00")],
        },
    );

    let created = fx.engine.create_fee_structure(request).await.unwrap();
    assert_eq!(created.structures.len(), 1);
    assert_eq!(created.structures[0].scope(), StructureScope::Year);
    assert_eq!(created.structures[0].line_items[0].kind(), LineItemKind::OneOff);
}

#[tokio::test]
async fn yearly_request_replicates_to_every_term() {
    let fx = Fixture::new().await;
    let class_id = fx.classes[1];
    let request = fx.request(
        vec![class_id],
        "Standard",
        CreationMode::Yearly {
            items: vec![item("Tuition", "1200.00"), annual_item("Activity", "150.00")],
        },
    );

    let created = fx.engine.create_fee_structure(request).await.unwrap();
    assert_eq!(created.structures.len(), 3);

    for ordinal in 1..=3 {
        let items = fx
            .engine
            .resolve_line_items(class_id, fx.term_id(ordinal))
            .await
            .unwrap();
        let names: Vec<&str> = items.iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["Tuition", "Activity"]);
    }
}

#[tokio::test]
async fn class_count_is_bounded() {
    let fx = Fixture::new().await;

    let empty = fx.termly(vec![], 1, "Fees", vec![item("Tuition", "1")]);
    let err = fx.engine.create_fee_structure(empty).await.unwrap_err();
    assert_eq!(field_of(err), "class_ids");

    let mut eleven = Vec::new();
    for _ in 0..11 {
        let class_id = Uuid::new_v4();
        fx.directory.add_class(class_id).await;
        eleven.push(class_id);
    }
    let too_many = fx.termly(eleven.clone(), 1, "Fees", vec![item("Tuition", "1")]);
    let err = fx.engine.create_fee_structure(too_many).await.unwrap_err();
    assert_eq!(field_of(err), "class_ids");

    let ten = fx.termly(eleven[..10].to_vec(), 1, "Fees", vec![item("Tuition", "1")]);
    assert!(fx.engine.create_fee_structure(ten).await.is_ok());
}

#[tokio::test]
async fn unknown_class_rejected() {
    let fx = Fixture::new().await;
    let request = fx.termly(
        vec![fx.classes[0], Uuid::new_v4()],
        1,
        "Fees",
        vec![item("Tuition", "1")],
    );
    let err = fx.engine.create_fee_structure(request).await.unwrap_err();
    assert_eq!(field_of(err), "class_ids[1]");
}

#[tokio::test]
async fn invalid_line_item_rejected_with_field() {
    let fx = Fixture::new().await;
    let request = fx.termly(
        vec![fx.classes[0]],
        1,
        "Fees",
        vec![item("Tuition", "1000.00"), item("Lab", "-10.00")],
    );
    let err = fx.engine.create_fee_structure(request).await.unwrap_err();
    assert_eq!(field_of(err), "items[1].amount");

    let both_flags = fee_service::models::LineItemInput {
        is_one_off: true,
        ..annual_item("Uniform", "500.00")
    };
    let request = fx.termly(vec![fx.classes[0]], 1, "Fees", vec![both_flags]);
    let err = fx.engine.create_fee_structure(request).await.unwrap_err();
    assert_eq!(field_of(err), "items[0].is_one_off");

    let listed = fx
        .engine
        .list_structures(&ListStructuresFilter::default())
        .await
        .unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn composite_request_is_all_or_nothing() {
    let fx = Fixture::new().await;
    let class_id = fx.classes[0];
    fx.engine
        .create_fee_structure(fx.termly(vec![class_id], 2, "Term 2", vec![item("Tuition", "900")]))
        .await
        .unwrap();

    // term 1 is free, term 2 collides: nothing may be written
    let request = fx.request(
        vec![class_id],
        "2026 Fees",
        CreationMode::Annual {
            term1_items: vec![item("Tuition", "1000")],
            term2_items: vec![item("Tuition", "1000")],
            term3_items: vec![],
            annual_items: vec![],
            one_off_items: vec![],
        },
    );
    let err = fx.engine.create_fee_structure(request).await.unwrap_err();
    assert!(matches!(err, FeeError::Conflict(_)));

    assert!(fx
        .engine
        .resolve_line_items(class_id, fx.term_id(1))
        .await
        .unwrap()
        .is_empty());
    let listed = fx
        .engine
        .list_structures(&ListStructuresFilter {
            academic_year_id: Some(fx.academic_year_id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn listing_filters_by_class() {
    let fx = Fixture::new().await;
    fx.engine
        .create_fee_structure(fx.termly(vec![fx.classes[0]], 1, "A", vec![item("Tuition", "1")]))
        .await
        .unwrap();
    fx.engine
        .create_fee_structure(fx.termly(vec![fx.classes[1]], 1, "B", vec![item("Tuition", "1")]))
        .await
        .unwrap();

    let listed = fx
        .engine
        .list_structures(&ListStructuresFilter {
            campus_id: Some(fx.campus_id),
            class_id: Some(fx.classes[1]),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].structure_name, "B");
}
