use crate::queue::{OutOfMemory, PacketQueue};

#[test]
fn test_enqueue_dequeue_whole_packet() {
    let mut queue = PacketQueue::default();
    queue.enqueue(3, b"hello").unwrap();
    assert_eq!(5, queue.buffered());

    let mut buffer = [0x0; 5];
    assert_eq!(Some(5), queue.dequeue_for(3, &mut buffer));
    assert_eq!(b"hello", &buffer);

    assert!(queue.is_empty());
    assert_eq!(0, queue.buffered());
    assert_eq!(None, queue.dequeue_for(3, &mut buffer));
}

#[test]
fn test_dequeue_partial_packet() {
    let mut queue = PacketQueue::default();
    queue.enqueue(3, b"0123456789").unwrap();

    let mut first = [0x0; 4];
    assert_eq!(Some(4), queue.dequeue_for(3, &mut first));
    assert_eq!(b"0123", &first);
    assert_eq!(6, queue.buffered());
    assert_eq!(1, queue.len());

    let mut second = [0x0; 6];
    assert_eq!(Some(6), queue.dequeue_for(3, &mut second));
    assert_eq!(b"456789", &second);
    assert!(queue.is_empty());
}

#[test]
fn test_dequeue_larger_buffer() {
    let mut queue = PacketQueue::default();
    queue.enqueue(1, b"abc").unwrap();
    queue.enqueue(1, b"def").unwrap();

    let mut buffer = [0x0; 64];
    assert_eq!(Some(3), queue.dequeue_for(1, &mut buffer));
    assert_eq!(b"abc", &buffer[..3]);
    assert_eq!(Some(3), queue.dequeue_for(1, &mut buffer));
    assert_eq!(b"def", &buffer[..3]);
}

#[test]
fn test_dequeue_skips_other_sockets() {
    let mut queue = PacketQueue::default();
    queue.enqueue(1, b"aa").unwrap();
    queue.enqueue(2, b"bb").unwrap();
    queue.enqueue(1, b"cc").unwrap();

    let mut buffer = [0x0; 2];
    assert_eq!(Some(2), queue.dequeue_for(2, &mut buffer));
    assert_eq!(b"bb", &buffer);
    assert_eq!(None, queue.dequeue_for(2, &mut buffer));

    assert_eq!(Some(2), queue.dequeue_for(1, &mut buffer));
    assert_eq!(b"aa", &buffer);
    assert_eq!(Some(2), queue.dequeue_for(1, &mut buffer));
    assert_eq!(b"cc", &buffer);
}

#[test]
fn test_partial_dequeue_keeps_position() {
    let mut queue = PacketQueue::default();
    queue.enqueue(1, b"abcd").unwrap();
    queue.enqueue(1, b"ef").unwrap();

    let mut buffer = [0x0; 3];
    assert_eq!(Some(3), queue.dequeue_for(1, &mut buffer));
    assert_eq!(b"abc", &buffer);

    assert_eq!(Some(1), queue.dequeue_for(1, &mut buffer));
    assert_eq!(b'd', buffer[0]);
    assert_eq!(Some(2), queue.dequeue_for(1, &mut buffer));
    assert_eq!(b"ef", &buffer[..2]);
}

#[test]
fn test_purge_idempotent() {
    let mut queue = PacketQueue::default();
    queue.enqueue(1, b"aa").unwrap();
    queue.enqueue(2, b"bb").unwrap();
    queue.enqueue(1, b"cc").unwrap();

    queue.purge(1);
    assert_eq!(1, queue.len());
    assert_eq!(2, queue.buffered());
    assert!(!queue.has_packet(1));

    queue.purge(1);
    assert_eq!(1, queue.len());
    assert_eq!(2, queue.buffered());

    // Tail stays valid after purging the last packet
    queue.enqueue(1, b"dd").unwrap();
    let mut buffer = [0x0; 2];
    assert_eq!(Some(2), queue.dequeue_for(2, &mut buffer));
    assert_eq!(b"bb", &buffer);
    assert_eq!(Some(2), queue.dequeue_for(1, &mut buffer));
    assert_eq!(b"dd", &buffer);
}

#[test]
fn test_budget_exhausted() {
    let mut queue = PacketQueue::new(8);
    queue.enqueue(1, b"123456").unwrap();
    assert_eq!(2, queue.available());

    assert_eq!(Err(OutOfMemory), queue.enqueue(1, b"7890"));
    assert_eq!(Err(OutOfMemory), queue.allocate(3));
    assert_eq!(1, queue.len());

    let mut buffer = [0x0; 6];
    queue.dequeue_for(1, &mut buffer).unwrap();
    queue.enqueue(1, b"7890").unwrap();
    assert_eq!(4, queue.buffered());
}

#[test]
fn test_allocate_zeroed() {
    let queue = PacketQueue::default();
    let buffer = queue.allocate(16).unwrap();

    assert_eq!(16, buffer.len());
    assert!(buffer.iter().all(|byte| *byte == 0x0));
}

#[test]
fn test_clear() {
    let mut queue = PacketQueue::default();
    queue.enqueue(1, b"aa").unwrap();
    queue.enqueue(2, b"bb").unwrap();

    queue.clear();

    assert!(queue.is_empty());
    assert_eq!(0, queue.buffered());
}
