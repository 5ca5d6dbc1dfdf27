#![cfg(test)]

use super::SortedList;

#[test]
fn insert_keeps_descending_order() {
    let mut list = SortedList::new();
    for v in [3u8, 60, 31, 0, 45] {
        list.insert_desc_by_key(v, |&x| x);
    }

    let collected: Vec<u8> = list.iter().copied().collect();
    assert_eq!(collected, [60, 45, 31, 3, 0]);
    assert_eq!(list.front(), Some(&60));
    assert_eq!(list.back(), Some(&0));
}

#[test]
fn equal_keys_drain_fifo() {
    // Elements are (key, arrival tag); equal keys must keep arrival order.
    let mut list = SortedList::new();
    list.insert_desc_by_key((31u8, 'a'), |e| e.0);
    list.insert_desc_by_key((31, 'b'), |e| e.0);
    list.insert_desc_by_key((63, 'x'), |e| e.0);
    list.insert_desc_by_key((31, 'c'), |e| e.0);

    assert_eq!(list.pop_front(), Some((63, 'x')));
    assert_eq!(list.pop_front(), Some((31, 'a')));
    assert_eq!(list.pop_front(), Some((31, 'b')));
    assert_eq!(list.pop_front(), Some((31, 'c')));
    assert_eq!(list.pop_front(), None);
}

#[test]
fn pop_back_takes_lowest() {
    let mut list = SortedList::new();
    for v in [10u8, 50, 30] {
        list.insert_desc_by_key(v, |&x| x);
    }

    assert_eq!(list.pop_back(), Some(10));
    assert_eq!(list.pop_back(), Some(30));
    assert_eq!(list.pop_back(), Some(50));
    assert!(list.is_empty());
}

#[test]
fn remove_first_matching() {
    let mut list = SortedList::new();
    for v in [5u8, 40, 20] {
        list.insert_desc_by_key(v, |&x| x);
    }

    assert_eq!(list.remove_first(|&v| v == 20), Some(20));
    assert_eq!(list.remove_first(|&v| v == 20), None);
    assert_eq!(list.len(), 2);
}

#[test]
fn option_keys_sort_none_last() {
    // Ceiling-ordered lock lists use Option<u8> keys; None must sink.
    let mut list = SortedList::new();
    list.insert_desc_by_key((None::<u8>, 1u32), |e| e.0);
    list.insert_desc_by_key((Some(40), 2), |e| e.0);
    list.insert_desc_by_key((Some(10), 3), |e| e.0);

    assert_eq!(list.front().unwrap().1, 2);
    assert_eq!(list.back().unwrap().1, 1);
}
