//! Public-API integration tests for the guarded buffer.

use std::io::{self, Read};

use guardbuf::{alloc, required_bytes, BufferError, ReallocError, CANARY_SIZE, GUARD_PAGES};

const TEXT: &[u8] = b"Hello, world! I am secure :)";

#[test]
fn hello_world_round_trip() {
    let mut buffer = alloc(3 * TEXT.len()).expect("alloc failed");

    buffer.write(TEXT).expect("write failed");
    assert_eq!(buffer.view(), TEXT);

    buffer.write(TEXT).expect("second write failed");
    assert_eq!(buffer.view(), &[TEXT, TEXT].concat()[..]);

    buffer.free().expect("free failed");
}

#[test]
fn required_bytes_covers_overhead() {
    let page = memsys::page_size();
    for capacity in [1, 100, page, 2 * page + 1] {
        let total = required_bytes(capacity);
        assert_eq!(total % page, 0);
        assert!(total >= capacity + CANARY_SIZE + GUARD_PAGES * page);
    }
}

#[test]
fn fresh_buffer_has_empty_view() {
    let mut buffer = alloc(100).expect("alloc failed");
    assert!(buffer.view().is_empty());
    assert_eq!(buffer.capacity(), 100);
    buffer.free().expect("free failed");
}

#[test]
fn overlong_write_is_partial() {
    let mut buffer = alloc(10).expect("alloc failed");

    match buffer.write(TEXT) {
        Err(BufferError::BufferFull { written }) => assert_eq!(written, 10),
        other => panic!("expected BufferFull, got {other:?}"),
    }
    assert_eq!(buffer.view(), &TEXT[..10]);

    buffer.free().expect("free failed");
}

#[test]
fn io_write_reports_partial_progress() {
    use std::io::Write;

    let mut buffer = alloc(10).expect("alloc failed");

    let n = Write::write(&mut buffer, TEXT).expect("io write failed");
    assert_eq!(n, 10);
    buffer.flush().expect("flush failed");

    buffer.free().expect("free failed");
    assert!(Write::write(&mut buffer, TEXT).is_err());
}

#[test]
fn seek_and_overwrite() {
    let mut buffer = alloc(32).expect("alloc failed");
    buffer.write(b"0123456789").expect("write failed");

    buffer.seek(5).expect("seek failed");
    buffer.write(b"ABC").expect("overwrite failed");
    assert_eq!(buffer.view(), b"01234ABC");

    assert!(matches!(
        buffer.seek(33),
        Err(BufferError::SeekOutOfBounds { .. })
    ));

    buffer.free().expect("free failed");
}

#[test]
fn read_from_consumes_source() {
    let mut buffer = alloc(64).expect("alloc failed");

    let mut source: &[u8] = TEXT;
    let n = buffer.read_from(&mut source).expect("read_from failed");
    assert_eq!(n, TEXT.len() as u64);
    assert_eq!(buffer.view(), TEXT);

    buffer.free().expect("free failed");
}

#[test]
fn read_from_full_buffer_reports_no_progress() {
    let mut buffer = alloc(8).expect("alloc failed");

    // More input than the buffer can hold: the source keeps offering
    // data the buffer cannot take.
    let mut source: &[u8] = TEXT;
    match buffer.read_from(&mut source) {
        Err(BufferError::NoProgress) => {}
        other => panic!("expected NoProgress, got {other:?}"),
    }
    assert_eq!(buffer.view(), &TEXT[..8]);

    buffer.free().expect("free failed");
}

/// Yields its payload once, then fails with `Interrupted` forever.
struct StalledSource {
    payload: Option<Vec<u8>>,
}

impl Read for StalledSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.payload.take() {
            Some(payload) => {
                let n = payload.len().min(buf.len());
                buf[..n].copy_from_slice(&payload[..n]);
                Ok(n)
            }
            None => Err(io::Error::from(io::ErrorKind::Interrupted)),
        }
    }
}

#[test]
fn read_from_stalled_source_reports_no_progress() {
    let mut buffer = alloc(64).expect("alloc failed");

    let mut source = StalledSource {
        payload: Some(TEXT.to_vec()),
    };
    match buffer.read_from(&mut source) {
        Err(BufferError::NoProgress) => {}
        other => panic!("expected NoProgress, got {other:?}"),
    }
    assert_eq!(buffer.view(), TEXT, "bytes before the stall are kept");

    buffer.free().expect("free failed");
}

#[test]
fn read_from_surfaces_source_errors() {
    struct BrokenSource;
    impl Read for BrokenSource {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::ConnectionReset))
        }
    }

    let mut buffer = alloc(16).expect("alloc failed");
    match buffer.read_from(&mut BrokenSource) {
        Err(BufferError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
        other => panic!("expected Io error, got {other:?}"),
    }
    buffer.free().expect("free failed");
}

#[test]
fn zero_then_reuse() {
    let mut buffer = alloc(TEXT.len()).expect("alloc failed");
    buffer.write(TEXT).expect("write failed");

    buffer.zero();
    assert!(buffer.view().is_empty());

    buffer.write(b"fresh").expect("write after zero failed");
    assert_eq!(buffer.view(), b"fresh");

    buffer.free().expect("free failed");
}

#[test]
fn double_free_reports_already_freed() {
    let mut buffer = alloc(16).expect("alloc failed");
    buffer.free().expect("first free failed");
    assert!(matches!(buffer.free(), Err(BufferError::AlreadyFreed)));
    assert!(matches!(buffer.write(b"x"), Err(BufferError::AlreadyFreed)));
}

#[test]
fn realloc_round_trip() {
    let mut buffer = alloc(TEXT.len()).expect("alloc failed");
    buffer.write(TEXT).expect("write failed");

    let mut bigger = buffer.realloc(4 * TEXT.len()).expect("realloc failed");
    assert!(buffer.is_freed());
    assert_eq!(bigger.view(), TEXT);

    bigger.write(TEXT).expect("write into bigger failed");
    assert_eq!(bigger.view(), &[TEXT, TEXT].concat()[..]);

    match bigger.realloc(4) {
        Err(ReallocError::BufferTooSmall { mut buffer }) => {
            buffer.free().expect("freeing rejected buffer failed");
        }
        other => panic!("expected BufferTooSmall, got {other:?}"),
    }
    assert!(!bigger.is_freed(), "source must survive a failed realloc");

    bigger.free().expect("free failed");
}
