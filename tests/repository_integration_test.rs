// ==========================================
// 仓储层集成测试
// ==========================================
// 职责: 验证排产单/订单行查询、负载聚合、变更集事务与提交时复核
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod repository_integration_test {
    use production_allocator::domain::{Mass, SheetStatus, SlotKey};
    use production_allocator::repository::{
        ItemChange, ItemChangeSet, ItemFilter, RepositoryError, SeqPosition,
    };

    use crate::test_helpers::{day, setup_env, slot};

    #[test]
    fn test_insert_normalizes_and_appends() {
        let env = setup_env();
        env.sheet("S1", "SO-1", 2);
        let a = env.item("a", "S1", Some("Unit 2"), 1.25, " gold ", "red");
        let b = env.item("b", "S1", Some("Unit 2"), 0.75, "GOLD", "");

        assert_eq!(a.quality, "GOLD");
        assert_eq!(a.color, "RED");
        assert_eq!(a.weight, Mass::from_kg(1250));
        assert_eq!(a.seq_no, 1);
        assert_eq!(b.seq_no, 2);
        assert!(b.created_seq > a.created_seq);
        assert_eq!(a.plan_date, day(2));
        assert_eq!(a.plan_name, "Default");
        assert_eq!(a.sheet_status, SheetStatus::Draft);
    }

    #[test]
    fn test_find_by_filter_and_scope() {
        let env = setup_env();
        env.sheet("S1", "SO-1", 2);
        env.sheet("S2", "SO-2", 4);
        env.item("a", "S1", Some("Unit 2"), 1.0, "GOLD", "RED");
        env.item("b", "S1", Some("Unit 3"), 1.0, "SILVER", "RED");
        env.item("c", "S2", Some("Unit 2"), 1.0, "GOLD", "WHITE");
        env.sheets.set_status("S2", SheetStatus::Cancelled).unwrap();

        let gold = env
            .items
            .find_by_filter(&ItemFilter {
                quality: Some("gold".to_string()),
                ..ItemFilter::default()
            })
            .unwrap();
        assert_eq!(gold.iter().map(|i| i.item_id.as_str()).collect::<Vec<_>>(), vec!["a"]);

        let with_cancelled = env
            .items
            .find_by_filter(&ItemFilter {
                unit_code: Some("Unit 2".to_string()),
                include_cancelled: true,
                ..ItemFilter::default()
            })
            .unwrap();
        assert_eq!(with_cancelled.len(), 2);

        let window = env
            .items
            .find_by_filter(&ItemFilter {
                date_from: Some(day(3)),
                date_to: Some(day(5)),
                include_cancelled: true,
                ..ItemFilter::default()
            })
            .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].item_id, "c");

        let scope = env.sheets.list_by_scope(day(2), "Default").unwrap();
        assert_eq!(scope.len(), 1);
        assert_eq!(scope[0].sheet_id, "S1");
    }

    #[test]
    fn test_sum_load_window_groups_by_slot() {
        let env = setup_env();
        env.fill("Unit 1", 2, 1.5, "PREMIUM");
        env.fill("Unit 1", 2, 0.5, "PREMIUM");
        env.fill("Unit 2", 3, 6.0, "GOLD");
        env.fill("Unit 2", 9, 6.0, "GOLD");

        let window = env
            .items
            .sum_load_window("Default", day(1), day(5))
            .unwrap();
        assert_eq!(
            window,
            vec![
                (slot("Unit 1", 2), Mass::from_tons(2.0)),
                (slot("Unit 2", 3), Mass::from_tons(6.0)),
            ]
        );
        assert!(env
            .items
            .sum_load_window("Rush", day(1), day(30))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_changeset_guard_rolls_back() {
        let env = setup_env();
        env.fill("Unit 1", 2, 4.0, "PREMIUM");
        env.sheet("S1", "SO-1", 2);
        env.item("x", "S1", Some("Unit 3"), 0.5, "PREMIUM", "RED");

        let target = slot("Unit 1", 2);
        let mut changeset = ItemChangeSet::new();
        changeset
            .push(ItemChange::Relocate {
                item_id: "x".to_string(),
                target: target.clone(),
                position: SeqPosition::Append,
            })
            .guard(target, Mass::from_tons(4.4));

        let err = env.items.apply_changeset(&changeset).unwrap_err();
        assert!(
            matches!(err, RepositoryError::CapacityConflict { .. }),
            "{:?}",
            err
        );
        assert_eq!(env.get("x").unit_code.as_deref(), Some("Unit 3"));
        assert_eq!(env.load("Unit 1", 2), Mass::from_tons(4.0));
    }

    #[test]
    fn test_changeset_relocates_across_scope() {
        let env = setup_env();
        env.sheet("S1", "SO-1", 2);
        env.item("x", "S1", Some("Unit 3"), 0.5, "PREMIUM", "RED");
        env.item("y", "S1", Some("Unit 3"), 0.5, "PREMIUM", "RED");

        let target = SlotKey::new("Unit 1", day(6), "Default");
        let mut changeset = ItemChangeSet::new();
        changeset.push(ItemChange::Relocate {
            item_id: "x".to_string(),
            target: target.clone(),
            position: SeqPosition::At(5),
        });
        let applied = env.items.apply_changeset(&changeset).unwrap();

        assert_eq!(applied.seq_no("x"), Some(1));
        assert!(applied.removed_sheets.is_empty());
        let x = env.get("x");
        assert!(x.is_in_slot(&target));
        assert_ne!(x.sheet_id, "S1");
        assert_eq!(env.get("y").seq_no, 1);
    }

    #[test]
    fn test_set_status_unknown_sheet() {
        let env = setup_env();
        let err = env
            .sheets
            .set_status("missing", SheetStatus::Submitted)
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }), "{:?}", err);
    }
}
