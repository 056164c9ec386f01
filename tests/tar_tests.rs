use std::{
    io::Read,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use anyhow::Result;
use futures_lite::{io::AsyncReadExt, stream, StreamExt};
use tarstream::{
    assemble, octal::LONG_FIELD_MAX, ComposedEntry, Content, EntryDescriptor, EntryType, Error, HeaderBlock,
    Tarball, BLOCK_SIZE,
};

async fn drain(tarball: Tarball<'_>) -> std::io::Result<Vec<Vec<u8>>> {
    tarball.collect::<Vec<_>>().await.into_iter().collect()
}

fn block(bytes: &[u8], index: usize) -> HeaderBlock {
    let mut record = [0u8; BLOCK_SIZE];
    record.copy_from_slice(&bytes[index * BLOCK_SIZE..(index + 1) * BLOCK_SIZE]);
    HeaderBlock::from_bytes(record)
}

fn file(name: &str, data: &str) -> EntryDescriptor<'static> {
    EntryDescriptor::new(name).with_content(data)
}

#[test]
fn single_small_file() -> Result<()> {
    smol::block_on(async {
        let tarball = assemble(vec![EntryDescriptor::new("1.txt")
            .with_size(5)
            .with_content(Content::Buffer(b"1.txt".to_vec()))])?;
        let bytes = drain(tarball).await?.concat();
        assert_eq!(bytes.len(), 2048);

        let header = block(&bytes, 0);
        assert_eq!(header.name(), b"1.txt");
        assert_eq!(header.entry_type(), Ok(EntryType::Regular));
        assert_eq!(&bytes[124..136], b"00000000005\0");
        assert_eq!(header.checksum(), Some(header.compute_checksum()));

        assert_eq!(&bytes[512..517], b"1.txt");
        assert!(bytes[517..].iter().all(|b| *b == 0));
        Ok(())
    })
}

#[test]
fn two_files_in_order() -> Result<()> {
    smol::block_on(async {
        let tarball = Tarball::new(vec![file("1.txt", "1.txt"), file("2.txt", "2.txt")])?;
        let bytes = drain(tarball).await?.concat();
        assert_eq!(bytes.len(), 3072);
        assert_eq!(block(&bytes, 0).name(), b"1.txt");
        assert_eq!(&bytes[512..517], b"1.txt");
        assert_eq!(block(&bytes, 2).name(), b"2.txt");
        assert_eq!(&bytes[1536..1541], b"2.txt");
        assert!(bytes[2048..].iter().all(|b| *b == 0));
        Ok(())
    })
}

#[test]
fn streamed_content_is_not_repadded() -> Result<()> {
    smol::block_on(async {
        let first = vec![1u8; 511];
        let second = vec![2u8; 513];
        let content = Content::from_stream(stream::iter(vec![Ok(first.clone()), Ok(second.clone())]));
        let tarball = Tarball::new(vec![EntryDescriptor::new("chunks")
            .with_size(1024)
            .with_content(content)])?;
        let chunks = drain(tarball).await?;
        let lens: Vec<_> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(lens, vec![512, 511, 513, 512, 512]);
        let bytes = chunks.concat();
        assert_eq!(&bytes[512..1023], &first[..]);
        assert_eq!(&bytes[1023..1536], &second[..]);
        assert_eq!(bytes.len(), 512 + 1024 + 1024);
        Ok(())
    })
}

#[test]
fn empty_archive_is_rejected() {
    assert!(matches!(assemble(Vec::new()), Err(Error::EmptyArchive)));
}

#[test]
fn bad_entry_rejects_whole_archive() {
    let result = Tarball::new(vec![file("ok", "x"), EntryDescriptor::new("dir/")]);
    assert!(matches!(result, Err(Error::DirectoryName(_))));
}

#[test]
fn huge_unsplittable_entry_is_lazy() -> Result<()> {
    smol::block_on(async {
        let name = "0123456789".repeat(20) + "01234";
        let size = 9 * 1024 * 1024 * 1024u64;
        let chunk = 1024 * 1024;
        let content = Content::from_stream(stream::repeat_with(move || Ok(vec![0u8; chunk])));
        let mut tarball = Tarball::new(vec![EntryDescriptor::new(name.as_str())
            .with_size(size)
            .with_mtime(0o14307600623)
            .with_content(content)])?;

        let mut head = Vec::new();
        for _ in 0..3 {
            head.extend(tarball.next().await.unwrap()?);
        }
        assert_eq!(head.len(), 3 * 512);

        let pax = block(&head, 0);
        assert_eq!(pax.name(), b"PaxHeader/@PaxHeader");
        assert_eq!(pax.entry_type(), Ok(EntryType::PaxLocal));
        let records = format!("215 path={}\n19 size={}\n", name, size);
        assert_eq!(pax.size(), Some(records.len() as u64));
        assert_eq!(&head[512..512 + records.len()], records.as_bytes());

        let header = block(&head, 2);
        assert!(header.name().starts_with(b"@PathCut/_pc_root/0123456789"));
        assert_eq!(header.name().len(), 99);
        assert_eq!(header.size(), Some(size & LONG_FIELD_MAX));
        assert_eq!(&head[1024 + 124..1024 + 136], b"10000000000\0");
        assert_eq!(header.mtime(), Some(0o14307600623));

        let first_content = tarball.next().await.unwrap()?;
        assert_eq!(first_content.len(), chunk);
        Ok(())
    })
}

#[test]
fn short_stream_fails_the_archive() -> Result<()> {
    smol::block_on(async {
        let content = Content::from_stream(stream::once(Ok(vec![1u8; 10])));
        let tarball = Tarball::new(vec![EntryDescriptor::new("short")
            .with_size(20)
            .with_content(content)])?;
        let err = drain(tarball).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
        Ok(())
    })
}

#[test]
fn nothing_follows_a_failed_entry() -> Result<()> {
    smol::block_on(async {
        let content = Content::from_stream(stream::once(Ok(vec![1u8; 10])));
        let mut tarball = Tarball::new(vec![
            EntryDescriptor::new("short").with_size(20).with_content(content),
            file("next", "abc"),
        ])?;
        let mut items = Vec::new();
        while let Some(item) = tarball.next().await {
            items.push(item);
        }
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().map(|c| c.len()).ok(), Some(512));
        assert_eq!(items[1].as_ref().map(|c| c.len()).ok(), Some(10));
        let err = items[2].as_ref().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
        assert!(tarball.next().await.is_none());
        Ok(())
    })
}

#[test]
fn reader_content_and_async_read_output() -> Result<()> {
    smol::block_on(async {
        let data = b"read through AsyncRead".repeat(100);
        let tarball = Tarball::new(vec![EntryDescriptor::new("dir/file.txt")
            .with_size(data.len() as u64)
            .with_content(Content::from_reader(futures_lite::io::Cursor::new(data.clone())))])?;
        let mut out = Vec::new();
        tarball.into_reader().read_to_end(&mut out).await?;
        assert_eq!(out.len() % BLOCK_SIZE, 0);
        assert_eq!(out.len(), 512 + 2560 + 1024);
        assert_eq!(&out[512..512 + data.len()], &data[..]);
        Ok(())
    })
}

#[test]
fn readers_are_opened_on_demand() -> Result<()> {
    smol::block_on(async {
        let opened = Arc::new(AtomicUsize::new(0));
        let entries = (0..3).map(|i| {
            let opened = Arc::clone(&opened);
            EntryDescriptor::new(format!("file{}", i))
                .with_size(4)
                .with_content(Content::open_with(move || async move {
                    opened.fetch_add(1, Ordering::SeqCst);
                    Ok(futures_lite::io::Cursor::new(b"data".to_vec()))
                }))
        });
        let mut tarball = Tarball::new(entries)?;
        assert_eq!(opened.load(Ordering::SeqCst), 0);

        let header = tarball.next().await.unwrap()?;
        assert_eq!(block(&header, 0).name(), b"file0");
        assert_eq!(opened.load(Ordering::SeqCst), 0);
        assert_eq!(tarball.next().await.unwrap()?, b"data");
        assert_eq!(opened.load(Ordering::SeqCst), 1);

        let rest = drain(tarball).await?.concat();
        assert_eq!(opened.load(Ordering::SeqCst), 3);
        // padding, then two entries of header, content and padding, then the terminator
        assert_eq!(rest.len(), 508 + 2 * 1024 + 1024);
        Ok(())
    })
}

#[test]
fn failed_open_fails_the_archive() -> Result<()> {
    smol::block_on(async {
        let content = Content::open_with(|| async {
            Err::<futures_lite::io::Cursor<Vec<u8>>, _>(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "gone",
            ))
        });
        let tarball = Tarball::new(vec![
            EntryDescriptor::new("gone").with_size(1).with_content(content),
            file("after", "x"),
        ])?;
        let err = drain(tarball).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
        Ok(())
    })
}

#[test]
fn headers_decode_back_bit_for_bit() -> Result<()> {
    smol::block_on(async {
        let long = format!("{}/{}", "d".repeat(140), "f".repeat(60));
        let unsplittable = "g".repeat(180);
        let entries = || {
            vec![
                file("a.txt", "alpha"),
                EntryDescriptor::new(long.as_str()).with_mode(0o644).with_content("beta"),
                EntryDescriptor::new("link")
                    .with_entry_type(EntryType::Symlink)
                    .with_link_name("a.txt"),
                file(&unsplittable, "gamma"),
            ]
        };
        let composed = entries()
            .into_iter()
            .map(ComposedEntry::new)
            .collect::<tarstream::Result<Vec<_>>>()?;
        let extension = composed[3].extension_header().cloned();
        let main = composed[3].header().clone();
        assert!(extension.is_some());
        let expected: Vec<HeaderBlock> = entries()
            .iter()
            .map(|e| tarstream::header::resolve(e).map(|(h, _)| h))
            .collect::<tarstream::Result<_>>()?;
        let bytes = drain(Tarball::new(entries())?).await?.concat();
        assert_eq!(block(&bytes, 0), expected[0]);
        assert_eq!(block(&bytes, 2), expected[1]);
        assert_eq!(block(&bytes, 2).path(), long.as_bytes());
        assert_eq!(block(&bytes, 4), expected[2]);
        assert_eq!(block(&bytes, 4).link_name(), b"a.txt");
        // pax header, one block of records, main header, one content block
        assert_eq!(Some(block(&bytes, 5)), extension);
        assert_eq!(block(&bytes, 5).name(), b"PaxHeader/@PaxHeader");
        assert_eq!(block(&bytes, 7), main);
        assert_eq!(block(&bytes, 7), expected[3]);
        assert_eq!(&bytes[8 * 512..8 * 512 + 5], b"gamma");
        assert_eq!(bytes.len(), 11 * 512);
        Ok(())
    })
}

#[test]
fn readable_by_the_tar_crate() -> Result<()> {
    smol::block_on(async {
        let split = format!("{}/{}", "a".repeat(150), "b".repeat(90));
        let pax = "c".repeat(205);
        let deep = format!("{}/{}", "e".repeat(200), "f".repeat(120));
        let unicode = format!("{}/ファイル.txt", "ü".repeat(70));
        let entries = vec![
            file("small.txt", "small"),
            file(&split, "split"),
            file(&pax, "pax"),
            file(&deep, "deep"),
            file(&unicode, "unicode"),
            EntryDescriptor::new("big.bin")
                .with_mode(0o600)
                .with_uid(1000)
                .with_gid(100)
                .with_mtime(1_700_000_000)
                .with_content(vec![0xa5u8; 5000]),
        ];
        let bytes = drain(Tarball::new(entries)?).await?.concat();

        let mut archive = tar::Archive::new(std::io::Cursor::new(bytes));
        let mut seen = Vec::new();
        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = String::from_utf8(entry.path_bytes().into_owned())?;
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            if path == "big.bin" {
                assert_eq!(entry.header().mode()?, 0o600);
                assert_eq!(entry.header().uid()?, 1000);
                assert_eq!(entry.header().gid()?, 100);
                assert_eq!(entry.header().mtime()?, 1_700_000_000);
                assert_eq!(data, vec![0xa5u8; 5000]);
            }
            seen.push((path, data.len()));
        }
        assert_eq!(
            seen,
            vec![
                ("small.txt".to_string(), 5),
                (split, 5),
                (pax, 3),
                (deep, 4),
                (unicode, 7),
                ("big.bin".to_string(), 5000),
            ]
        );
        Ok(())
    })
}
