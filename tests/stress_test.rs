//! Many producers, several consumers, every key processed exactly once.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use workq::Queue;

const PRODUCERS: u64 = 10;
const CONSUMERS: usize = 3;
const KEYS: u64 = 1000;

#[test]
fn distinct_keys_are_each_processed_once() {
    let q: Queue<u64> = Queue::new();
    let done_calls: Arc<Mutex<HashMap<u64, u32>>> = Arc::new(Mutex::new(HashMap::new()));

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let q = q.clone();
            let done_calls = Arc::clone(&done_calls);
            thread::spawn(move || {
                while let Some(key) = q.get() {
                    *done_calls.lock().entry(key).or_default() += 1;
                    q.done(&key);
                }
            })
        })
        .collect();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let q = q.clone();
            thread::spawn(move || {
                for key in (p..KEYS).step_by(PRODUCERS as usize) {
                    q.add(key);
                }
            })
        })
        .collect();

    for handle in producers {
        handle.join().unwrap();
    }
    q.shut_down_with_drain();
    for handle in consumers {
        handle.join().unwrap();
    }

    let done_calls = done_calls.lock();
    assert_eq!(done_calls.len() as u64, KEYS);
    assert_eq!(done_calls.values().map(|n| *n as u64).sum::<u64>(), KEYS);
    assert!(done_calls.values().all(|n| *n == 1));
    assert!(q.is_empty());
}

#[test]
fn overlapping_producers_collapse_duplicate_adds() {
    let q: Queue<u64> = Queue::new();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let q = q.clone();
            thread::spawn(move || {
                for key in 0..KEYS {
                    q.add(key);
                }
            })
        })
        .collect();
    for handle in producers {
        handle.join().unwrap();
    }

    assert_eq!(q.len() as u64, KEYS);
}
