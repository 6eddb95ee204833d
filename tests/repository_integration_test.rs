// ==========================================
// Repository 层集成测试
// ==========================================
// 测试目标: 文件数据库上的持久化往返与跨连接乐观锁
// ==========================================


use std::sync::{Arc, Mutex};

use mps_engine::db::open_sqlite_connection;
use mps_engine::domain::action_log::ActionLog;
use mps_engine::domain::schedule::{LineInput, LineUpdate, PlanningFences};
use mps_engine::domain::types::{PeriodType, ScheduleAction, ScheduleStatus};
use mps_engine::engine::{NewSchedule, ScheduleAggregate};
use mps_engine::logging;
use mps_engine::repository::{ActionLogRepository, RepositoryError, ScheduleRepository};

use test_helpers::{at, create_test_db, d};

fn open_repos(db_path: &str) -> (ScheduleRepository, ActionLogRepository) {
    let conn = Arc::new(Mutex::new(open_sqlite_connection(db_path).unwrap()));
    (
        ScheduleRepository::new(conn.clone()),
        ActionLogRepository::new(conn),
    )
}

fn weekly_aggregate() -> ScheduleAggregate {
    ScheduleAggregate::create(
        NewSchedule {
            schedule_id: "S-INT".to_string(),
            schedule_number: "MPS-202607-0001".to_string(),
            name: "七月周计划".to_string(),
            description: None,
            period_start: d(2026, 7, 6),
            period_end: d(2026, 8, 2),
            period_type: PeriodType::Weekly,
            fences: PlanningFences::new(7, 7, 0),
            created_by: "planner".to_string(),
        },
        at(2026, 7, 1, 9),
    )
    .unwrap()
}

fn log(action: ScheduleAction, actor: &str) -> ActionLog {
    ActionLog::new(Some("S-INT".to_string()), action, actor, at(2026, 7, 1, 10))
}

#[test]
fn test_round_trip_through_file_database() {
    logging::init_test();
    let (_tmp, db_path) = create_test_db().unwrap();
    let (repo, _) = open_repos(&db_path);

    let mut agg = weekly_aggregate();
    repo.create(agg.header(), &log(ScheduleAction::CreateSchedule, "planner"))
        .unwrap();
    for (week, date) in [d(2026, 7, 6), d(2026, 7, 13), d(2026, 7, 20)].into_iter().enumerate() {
        let mut input = LineInput::new("P1", date, 40.0, 25.0, 30.0).with_safety_stock(10.0);
        if week == 0 {
            input = input.with_beginning_inventory(50.0);
        }
        agg.add_line(input, d(2026, 7, 1)).unwrap();
    }
    let revision = repo
        .save(agg.header(), agg.lines(), &log(ScheduleAction::AddLine, "planner"))
        .unwrap();
    agg.mark_persisted(revision);

    // 另一个连接读取到相同内容
    let (other, _) = open_repos(&db_path);
    let (header, lines) = other.load("S-INT").unwrap().unwrap();
    let restored = ScheduleAggregate::restore(header, lines).unwrap();
    assert_eq!(restored.header(), agg.header());
    assert_eq!(
        restored.lines().cloned().collect::<Vec<_>>(),
        agg.lines().cloned().collect::<Vec<_>>()
    );

    let p1 = restored.product_lines("P1");
    assert_eq!(
        p1.iter().map(|l| l.projected_available_balance).collect::<Vec<_>>(),
        vec![40.0, 30.0, 20.0]
    );
    assert_eq!(p1[0].available_to_promise, Some(55.0));
}

#[test]
fn test_concurrent_writers_on_separate_connections() {
    let (_tmp, db_path) = create_test_db().unwrap();
    let (repo_a, logs) = open_repos(&db_path);
    let (repo_b, _) = open_repos(&db_path);

    let mut agg = weekly_aggregate();
    repo_a
        .create(agg.header(), &log(ScheduleAction::CreateSchedule, "planner"))
        .unwrap();
    agg.add_line(
        LineInput::new("P1", d(2026, 7, 20), 10.0, 10.0, 10.0),
        d(2026, 7, 1),
    )
    .unwrap();
    let revision = repo_a
        .save(agg.header(), agg.lines(), &log(ScheduleAction::AddLine, "planner"))
        .unwrap();
    let line_id = agg.lines().next().unwrap().line_id.clone();

    // 两个写入方基于同一修订号加载
    let load = |repo: &ScheduleRepository| {
        let (header, lines) = repo.load("S-INT").unwrap().unwrap();
        ScheduleAggregate::restore(header, lines).unwrap()
    };
    let mut writer_a = load(&repo_a);
    let mut writer_b = load(&repo_b);
    assert_eq!(writer_a.header().revision, revision);

    writer_a
        .update_line(
            &line_id,
            LineUpdate {
                forecast_qty: Some(12.0),
                ..Default::default()
            },
            d(2026, 7, 1),
        )
        .unwrap();
    writer_b.submit().unwrap();

    repo_a
        .save(writer_a.header(), writer_a.lines(), &log(ScheduleAction::UpdateLine, "alice"))
        .unwrap();
    let err = repo_b
        .save(writer_b.header(), writer_b.lines(), &log(ScheduleAction::Submit, "bob"))
        .unwrap_err();
    match err {
        RepositoryError::OptimisticLockFailure { expected, actual, .. } => {
            assert_eq!(expected, revision);
            assert_eq!(actual, revision + 1);
        }
        other => panic!("Expected OptimisticLockFailure, got {:?}", other),
    }

    // 失败方的修改与日志都未落库
    let stored = load(&repo_b);
    assert_eq!(stored.status(), ScheduleStatus::Draft);
    assert_eq!(stored.line(&line_id).unwrap().forecast_qty, 12.0);
    let actors: Vec<String> = logs
        .find_by_schedule_id("S-INT")
        .unwrap()
        .into_iter()
        .map(|l| l.actor)
        .collect();
    assert!(actors.contains(&"alice".to_string()));
    assert!(!actors.contains(&"bob".to_string()));
}
