//! Structural JSON diff
//!
//! Delta encoding:
//! - changed scalar or type: `[old, new]`
//! - added key or array item: `[new]`
//! - deleted key or array item: `[old, 0, 0]`
//! - array item moved: `["", new_index, 3]`, keyed by `_<old_index>`
//!
//! Objects produce a map of per-key deltas. Arrays produce a map keyed by item
//! index (`_`-prefixed for the old side) with `"_t": "a"`.

use serde_json::{Map, Value, json};

/// Marker stored at index 2 of a move delta
pub const MOVED: u64 = 3;

/// Compute the delta that turns `left` into `right`, `None` when they are equal
pub fn diff(left: &Value, right: &Value) -> Option<Value> {
    if left == right {
        return None;
    }

    match (left, right) {
        (Value::Object(left), Value::Object(right)) => diff_objects(left, right),
        (Value::Array(left), Value::Array(right)) => diff_arrays(left, right),
        _ => Some(json!([left, right])),
    }
}

/// Whether an array delta entry only records a reordering
pub fn is_move(delta: &Value) -> bool {
    delta
        .as_array()
        .and_then(|entry| entry.get(2))
        .and_then(Value::as_u64)
        == Some(MOVED)
}

fn diff_objects(left: &Map<String, Value>, right: &Map<String, Value>) -> Option<Value> {
    let mut delta = Map::new();

    for (key, old) in left {
        match right.get(key) {
            Some(new) => {
                if let Some(nested) = diff(old, new) {
                    delta.insert(key.clone(), nested);
                }
            }
            None => {
                delta.insert(key.clone(), json!([old, 0, 0]));
            }
        }
    }

    for (key, new) in right {
        if !left.contains_key(key) {
            delta.insert(key.clone(), json!([new]));
        }
    }

    (!delta.is_empty()).then_some(Value::Object(delta))
}

fn diff_arrays(left: &[Value], right: &[Value]) -> Option<Value> {
    let head = left
        .iter()
        .zip(right)
        .take_while(|(l, r)| l == r)
        .count();
    let max_tail = left.len().min(right.len()) - head;
    let tail = left
        .iter()
        .rev()
        .zip(right.iter().rev())
        .take(max_tail)
        .take_while(|(l, r)| l == r)
        .count();

    let old = &left[head..left.len() - tail];
    let new = &right[head..right.len() - tail];
    let (old_matched, new_matched) = longest_common_subsequence(old, new);

    let mut removed: Vec<usize> = (0..old.len()).filter(|i| !old_matched[*i]).collect();
    let mut added: Vec<usize> = (0..new.len()).filter(|j| !new_matched[*j]).collect();

    let mut delta = Map::new();

    // An item removed in one place and added in another is a move
    removed.retain(|&i| {
        let Some(pos) = added.iter().position(|&j| new[j] == old[i]) else {
            return true;
        };
        let j = added.remove(pos);
        delta.insert(format!("_{}", head + i), json!(["", head + j, MOVED]));
        false
    });

    for i in removed {
        delta.insert(format!("_{}", head + i), json!([old[i], 0, 0]));
    }
    for j in added {
        delta.insert((head + j).to_string(), json!([new[j]]));
    }

    if delta.is_empty() {
        return None;
    }
    delta.insert("_t".to_string(), json!("a"));
    Some(Value::Object(delta))
}

/// Mark which items of each side belong to one longest common subsequence
fn longest_common_subsequence(old: &[Value], new: &[Value]) -> (Vec<bool>, Vec<bool>) {
    let (n, m) = (old.len(), new.len());
    let mut lengths = vec![vec![0usize; m + 1]; n + 1];

    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lengths[i][j] = if old[i] == new[j] {
                lengths[i + 1][j + 1] + 1
            } else {
                lengths[i + 1][j].max(lengths[i][j + 1])
            };
        }
    }

    let mut old_matched = vec![false; n];
    let mut new_matched = vec![false; m];
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            old_matched[i] = true;
            new_matched[j] = true;
            i += 1;
            j += 1;
        } else if lengths[i + 1][j] >= lengths[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }

    (old_matched, new_matched)
}
