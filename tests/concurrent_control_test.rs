// ==========================================
// 并发控制测试
// ==========================================
// 职责: 验证多连接并发移动时，提交时产能复核保证槽位不超硬上限
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod concurrent_control_test {
    use production_allocator::api::ApiError;
    use production_allocator::config::AllocatorConfig;
    use production_allocator::domain::Mass;
    use production_allocator::engine::{MoveOutcome, MoveOverrides, MovePolicy};
    use production_allocator::ScheduleApi;
    use std::sync::{Arc, Barrier};
    use std::thread;

    use crate::test_helpers::{open_shared, setup_env, slot};

    const WORKERS: usize = 8;

    #[derive(Debug)]
    enum WorkerResult {
        Moved,
        Overflow,
        Conflict,
    }

    fn run_workers(db_path: &str, policy: MovePolicy) -> Vec<WorkerResult> {
        let barrier = Arc::new(Barrier::new(WORKERS));
        let handles: Vec<_> = (0..WORKERS)
            .map(|i| {
                let db_path = db_path.to_string();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    // 每个线程独立连接，模拟多个客户端
                    let api = ScheduleApi::new(open_shared(&db_path), AllocatorConfig::default())
                        .unwrap();
                    barrier.wait();
                    let result = api.move_item(
                        &format!("X{}", i),
                        "Unit 1",
                        "2026-03-02",
                        None,
                        None,
                        policy,
                        MoveOverrides::default(),
                    );
                    match result {
                        Ok(MoveOutcome::Moved(_)) => WorkerResult::Moved,
                        Ok(MoveOutcome::Overflow(_)) => WorkerResult::Overflow,
                        Ok(MoveOutcome::Split(split)) => panic!("unexpected split: {:?}", split),
                        Err(ApiError::OptimisticLockFailure(_)) => WorkerResult::Conflict,
                        Err(e) => panic!("worker {} failed: {:?}", i, e),
                    }
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("worker panicked"))
            .collect()
    }

    #[test]
    fn test_concurrent_moves_respect_hard_limit() {
        let env = setup_env();
        env.sheet("S1", "SO-1", 2);
        for i in 0..WORKERS {
            env.item(&format!("X{}", i), "S1", Some("Unit 3"), 1.0, "PREMIUM", "RED");
        }

        let results = run_workers(&env.db_path, MovePolicy::Ask);
        let moved = results
            .iter()
            .filter(|r| matches!(r, WorkerResult::Moved))
            .count();

        let load = env.load("Unit 1", 2);
        assert!(load <= Mass::from_tons(4.4), "Unit 1 overloaded: {}", load);
        assert_eq!(load, Mass::from_tons(moved as f64));
        assert!((1..=4).contains(&moved), "moved {}", moved);
        assert_eq!(
            env.load("Unit 3", 2),
            Mass::from_tons((WORKERS - moved) as f64)
        );
    }

    #[test]
    fn test_concurrent_forced_moves_spread_without_overload() {
        let env = setup_env();
        env.sheet("S1", "SO-1", 2);
        for i in 0..WORKERS {
            env.item(&format!("X{}", i), "S1", None, 1.0, "PREMIUM", "RED");
        }

        let results = run_workers(&env.db_path, MovePolicy::ForceMove);
        let moved = results
            .iter()
            .filter(|r| matches!(r, WorkerResult::Moved))
            .count();
        assert!(results.iter().all(|r| !matches!(r, WorkerResult::Overflow)));

        let total: Mass = ["Unit 1", "Unit 3", "Unit 4"]
            .iter()
            .map(|u| env.load(u, 2))
            .sum();
        assert_eq!(total, Mass::from_tons(moved as f64));

        let table = env.api.load_table(None, "2026-03-02", "2026-03-04").unwrap();
        for row in table {
            assert!(row.load <= row.hard_limit, "{} overloaded", row.slot);
        }
        assert!(env.load("Unit 1", 2) <= Mass::from_tons(4.4));
        assert_eq!(env.items.sum_load(&slot("Unit 2", 2)).unwrap(), Mass::ZERO);
    }
}
