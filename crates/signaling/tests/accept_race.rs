//! Concurrency property: firing many simultaneous accepts for one
//! room yields exactly one winner.

use signaling::{AcceptOutcome, Room, RoomStatus, RoomStore};
use std::sync::Arc;
use tokio::sync::Barrier;
use uuid::Uuid;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_accepts_have_exactly_one_winner() {
    const CONTENDERS: usize = 16;

    let rooms = Arc::new(RoomStore::new());
    let contenders: Vec<Uuid> = (0..CONTENDERS).map(|_| Uuid::new_v4()).collect();

    let room = Room::new(
        "u1",
        Uuid::new_v4(),
        "ka",
        "en",
        "general",
        2.0,
        contenders.clone(),
    );
    let room_id = rooms.insert(room);

    let barrier = Arc::new(Barrier::new(CONTENDERS));
    let mut handles = Vec::new();
    for (i, conn) in contenders.iter().enumerate() {
        let rooms = rooms.clone();
        let barrier = barrier.clone();
        let conn = *conn;
        let translator_id = format!("t{}", i);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let outcome = rooms.try_accept(&room_id, &translator_id, conn);
            (translator_id, outcome)
        }));
    }

    let mut winners = Vec::new();
    let mut taken = 0;
    for handle in handles {
        let (translator_id, outcome) = handle.await.unwrap();
        match outcome {
            AcceptOutcome::Accepted(_) => winners.push(translator_id),
            AcceptOutcome::AlreadyTaken => taken += 1,
            AcceptOutcome::NotFound => panic!("room must exist during the race"),
        }
    }

    assert_eq!(winners.len(), 1, "exactly one accept must win");
    assert_eq!(taken, CONTENDERS - 1);
    assert_eq!(rooms.status(&room_id), Some(RoomStatus::Connecting));
    assert_eq!(rooms.bound_translator(&room_id), Some(winners[0].clone()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_race_between_accept_and_expiry_is_consistent() {
    // Whichever of accept and expiry wins, the loser must observe it:
    // an accepted room never times out, an expired room never accepts.
    for _ in 0..50 {
        let rooms = Arc::new(RoomStore::new());
        let conn = Uuid::new_v4();
        let room = Room::new("u1", Uuid::new_v4(), "ka", "en", "general", 2.0, vec![conn]);
        let room_id = rooms.insert(room);

        let barrier = Arc::new(Barrier::new(2));

        let accept = {
            let rooms = rooms.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                rooms.try_accept(&room_id, "t1", conn)
            })
        };
        let expire = {
            let rooms = rooms.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                rooms.expire(&room_id)
            })
        };

        let accept_outcome = accept.await.unwrap();
        let expired = expire.await.unwrap();

        match (accept_outcome, expired) {
            (AcceptOutcome::Accepted(_), None) => {
                assert_eq!(rooms.status(&room_id), Some(RoomStatus::Connecting));
            }
            (AcceptOutcome::NotFound, Some(_)) => {
                assert_eq!(rooms.status(&room_id), None);
            }
            (accept_outcome, expired) => panic!(
                "inconsistent outcome: accept={:?}, expired={:?}",
                accept_outcome, expired
            ),
        }
    }
}
