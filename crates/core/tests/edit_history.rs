use markup_core::{
    Annotation, AnnotationKind, AnnotationPatch, AnnotationStyle, Color, DocumentModel, InkPath, LineKind,
    MarkupKind, ModelStore, Operation, OpsLog, Point, Quad, Rect, ShapeKind,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const PAGE_COUNT: u32 = 5;

fn random_point(rng: &mut StdRng) -> Point {
    Point::new(rng.gen_range(0.0..600.0), rng.gen_range(0.0..800.0))
}

fn random_rect(rng: &mut StdRng) -> Rect {
    Rect::from_corners(random_point(rng), random_point(rng))
}

fn random_annotation(rng: &mut StdRng, page: u32) -> Annotation {
    let kind = match rng.gen_range(0..6) {
        0 => AnnotationKind::Markup {
            markup: MarkupKind::Highlight,
            quad_points: vec![Quad::from_rect(random_rect(rng))],
            selected_text: Some("text".to_owned()),
        },
        1 => AnnotationKind::Note { position: random_point(rng), content: "note".to_owned(), is_open: false },
        2 => AnnotationKind::Shape { shape: ShapeKind::Ellipse, rect: random_rect(rng) },
        3 => AnnotationKind::Line { line: LineKind::Arrow, start: random_point(rng), end: random_point(rng) },
        4 => AnnotationKind::Ink {
            paths: vec![InkPath::new((0..4).map(|_| random_point(rng)).collect())],
        },
        _ => AnnotationKind::Text { rect: random_rect(rng), content: "text box".to_owned() },
    };
    Annotation::new(page, kind, AnnotationStyle::red_markup())
}

fn random_patch(rng: &mut StdRng, annotation: &Annotation) -> AnnotationPatch {
    if rng.gen_bool(0.3) {
        return AnnotationPatch { style: Some(AnnotationStyle::new(Color::BLUE, 0.5)), ..Default::default() };
    }
    match &annotation.kind {
        AnnotationKind::Markup { .. } => AnnotationPatch {
            quad_points: Some(vec![Quad::from_rect(random_rect(rng))]),
            selected_text: Some(None),
            ..Default::default()
        },
        AnnotationKind::Note { .. } => {
            AnnotationPatch { position: Some(random_point(rng)), is_open: Some(true), ..Default::default() }
        }
        AnnotationKind::Shape { .. } => AnnotationPatch { rect: Some(random_rect(rng)), ..Default::default() },
        AnnotationKind::Line { .. } => AnnotationPatch { end: Some(random_point(rng)), ..Default::default() },
        AnnotationKind::Ink { .. } => AnnotationPatch { paths: Some(Vec::new()), ..Default::default() },
        AnnotationKind::Text { .. } => {
            AnnotationPatch { content: Some("edited".to_owned()), ..Default::default() }
        }
    }
}

/// Pick a random operation; some of them will be rejected by validation
fn random_operation(rng: &mut StdRng, log: &OpsLog) -> Operation {
    let existing = log.snapshot_annotations();
    let page = rng.gen_range(0..PAGE_COUNT);
    match rng.gen_range(0..7) {
        0 | 1 => Operation::add_annotation(random_annotation(rng, page)),
        2 if !existing.is_empty() => {
            let target = &existing[rng.gen_range(0..existing.len())];
            Operation::update_annotation(target.id.clone(), random_patch(rng, target))
        }
        3 if !existing.is_empty() => {
            Operation::delete_annotation(existing[rng.gen_range(0..existing.len())].clone())
        }
        4 => Operation::rotate_page(page, 90 * rng.gen_range(-3..=3)),
        5 => Operation::delete_page(page),
        _ => {
            let len = log.model().display_order().len();
            Operation::reorder_pages(rng.gen_range(0..len + 1), rng.gen_range(0..len))
        }
    }
}

fn assert_structure_invariants(model: &DocumentModel) {
    let order = model.display_order();
    assert_eq!(order.len() as u32, model.page_count() - model.deleted_pages().len() as u32);
    let mut sorted = order.to_vec();
    sorted.sort_unstable();
    let expected: Vec<u32> = (0..model.page_count()).filter(|page| !model.is_deleted(*page)).collect();
    assert_eq!(sorted, expected);
    assert!(model.page_rotations().values().all(|rotation| rotation % 90 == 0 && *rotation < 360));
}

#[test]
fn undo_all_returns_to_initial_state() {
    for seed in 0..20 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut log = OpsLog::new(PAGE_COUNT);
        let initial = log.model().state();

        let mut accepted = 0;
        for _ in 0..60 {
            let operation = random_operation(&mut rng, &log);
            if log.apply(operation).is_ok() {
                accepted += 1;
            }
            assert_structure_invariants(log.model());
        }
        assert_eq!(log.history().len(), accepted);
        let edited = log.model().state();

        while log.undo().unwrap() {
            assert_structure_invariants(log.model());
        }
        assert_eq!(log.model().state(), initial, "seed {seed}");

        while log.redo().unwrap() {}
        assert_eq!(log.model().state(), edited, "seed {seed}");
    }
}

#[test]
fn undo_then_redo_is_identity_at_every_step() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut log = OpsLog::new(PAGE_COUNT);

    for _ in 0..80 {
        let operation = random_operation(&mut rng, &log);
        if log.apply(operation).is_err() {
            continue;
        }
        let after = log.model().state();
        assert!(log.undo().unwrap());
        assert!(log.redo().unwrap());
        assert_eq!(log.model().state(), after);
    }
}

#[test]
fn redo_stack_is_cleared_by_new_edits() {
    let mut log = OpsLog::new(2);
    log.apply(Operation::rotate_page(0, 90)).unwrap();
    log.apply(Operation::rotate_page(1, 180)).unwrap();
    log.undo().unwrap();
    log.undo().unwrap();
    assert!(log.can_redo());

    log.apply(Operation::reorder_pages(0, 1)).unwrap();
    assert!(!log.can_redo());
    assert!(!log.redo().unwrap());
    assert_eq!(log.history().len(), 3);
}

#[test]
fn update_timestamps_never_move_backwards() {
    let mut log = OpsLog::new(1);
    let mut annotation = Annotation::with_id(
        "future",
        0,
        AnnotationKind::Text { rect: Rect::new(0.0, 0.0, 10.0, 10.0), content: "a".to_owned() },
        AnnotationStyle::default(),
    );
    annotation.updated_at = i64::MAX - 1;
    log.apply(Operation::add_annotation(annotation)).unwrap();

    log.apply(Operation::update_annotation(
        "future",
        AnnotationPatch { content: Some("b".to_owned()), ..Default::default() },
    ))
    .unwrap();

    let updated = log.by_id(&"future".into()).unwrap();
    assert_eq!(updated.updated_at, i64::MAX - 1);
}
