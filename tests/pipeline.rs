use bytes::Bytes;
use eddy::{ByteReader, Error, ReadChunks, Sequence, SequenceExt, bridge, iter};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// Reads little-endian u32 frames until the source runs dry and sums them.
async fn sum_frames<S>(reader: &mut ByteReader<S>) -> eddy::Result<u32>
where
    S: Sequence<Item = Bytes>,
{
    let mut total = 0u32;
    while let Some(frame) = reader.read(4).await? {
        let frame: [u8; 4] = frame[..]
            .try_into()
            .map_err(|_| Error::msg(format!("short frame of {} bytes", frame.len())))?;
        total = total.wrapping_add(u32::from_le_bytes(frame));
    }
    Ok(total)
}

#[tokio::test]
async fn test_sum_frames_from_bridged_chunks() {
    let (tx, rx) = bridge::<Bytes>();

    // 1. Chunks arrive one at a time, on boundaries unrelated to the frames
    tokio::spawn(async move {
        for chunk in [&[0x01, 0x02, 0x03, 0x04, 0x08][..], &[0x07, 0x06], &[0x05]] {
            sleep(Duration::from_millis(5)).await;
            tx.push(Bytes::copy_from_slice(chunk));
        }
        // Dropping the producer ends the stream
    });

    // 2. 0x04030201 + 0x05060708
    let mut reader = ByteReader::new(rx);
    let total = timeout(Duration::from_secs(1), sum_frames(&mut reader))
        .await
        .expect("frames should arrive")
        .unwrap();
    assert_eq!(total, 0x0909_0909);
    assert_eq!(reader.bytes_read(), 8);
}

#[tokio::test]
async fn test_sum_frames_from_transport() {
    let data: &[u8] = &[0x01, 0x02, 0x03, 0x04, 0x08, 0x07, 0x06, 0x05];
    let mut reader = ByteReader::new(ReadChunks::with_chunk_size(data, 3));
    assert_eq!(sum_frames(&mut reader).await.unwrap(), 0x0909_0909);
}

#[tokio::test]
async fn test_torn_frame_is_reported() {
    let chunks = iter([Bytes::from_static(&[1, 0, 0, 0, 2, 0])]);
    let mut reader = ByteReader::new(chunks);
    let e = sum_frames(&mut reader).await.unwrap_err();
    assert_eq!(e.to_string(), "upstream failed: short frame of 2 bytes");
}

#[tokio::test]
async fn test_bridge_into_tee_on_separate_tasks() {
    let (tx, rx) = bridge::<u32>();
    let mut branches = rx.tee(2);
    let mut slow = branches.pop().unwrap();
    let mut fast = branches.pop().unwrap();

    let fast = tokio::spawn(async move { fast.collect().await });
    let slow = tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Some(n) = slow.pull().await? {
            sleep(Duration::from_millis(2)).await;
            seen.push(n);
        }
        Ok::<_, Error>(seen)
    });

    for n in 0..20 {
        tx.push(n);
        if n % 5 == 0 {
            sleep(Duration::from_millis(1)).await;
        }
    }
    tx.end();

    let expected: Vec<u32> = (0..20).collect();
    assert_eq!(fast.await.unwrap().unwrap(), expected);
    assert_eq!(slow.await.unwrap().unwrap(), expected);
}

#[tokio::test]
async fn test_header_body_split_with_completion() {
    let lines = iter(["Host: a", "Accept: */*", "", "body 1", "body 2"]);
    let tracked = lines.alerting();
    let done = tracked.done();

    let (mut headers, mut body) = tracked.split_when(|line: &&str| line.is_empty());

    // 1. Headers up to the blank line
    assert_eq!(headers.collect().await.unwrap(), vec!["Host: a", "Accept: */*"]);

    // 2. The body starts at the separator
    let rest = body.collect().await.unwrap();
    assert_eq!(rest, vec!["", "body 1", "body 2"]);

    // 3. The underlying source reported its end
    done.await.unwrap();
}

#[tokio::test]
async fn test_pull_order_survives_timeouts() {
    let (tx, rx) = bridge::<&str>();

    // 1. A pull that gives up, then one that waits
    assert!(timeout(Duration::from_millis(5), rx.pull()).await.is_err());
    let waiting = rx.pull();

    // 2. The abandoned pull does not eat the value
    tx.push("kept");
    assert_eq!(waiting.await.unwrap(), Some("kept"));
    assert_eq!(rx.waiting(), 0);
}
