use anyhow::Result;
use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use walkdir::WalkDir;

use h5packer::{Error, ErrorKind, pack, unpack};

/// Relative path (always `/`-separated) → file contents for every regular file.
fn snapshot(root: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut files = BTreeMap::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry?;
        if entry.file_type().is_file() {
            let rel = entry.path().strip_prefix(root)?;
            let name = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            files.insert(name, fs::read(entry.path())?);
        }
    }
    Ok(files)
}

fn sample_course(root: &Path) -> Result<()> {
    fs::create_dir_all(root.join("content/images"))?;
    fs::create_dir_all(root.join("H5P.Column-1.16/scripts"))?;
    fs::create_dir_all(root.join("unused/empty-dir"))?;
    fs::write(root.join("h5p.json"), br#"{"title":"Course","mainLibrary":"H5P.Column"}"#)?;
    fs::write(root.join("content/content.json"), br#"{"content":[]}"#)?;
    fs::write(root.join("content/images/pixel.png"), [0x89, b'P', b'N', b'G', 0, 0, 0, 13, 0xFF, 0x00])?;
    fs::write(root.join("content/empty.txt"), b"")?;
    fs::write(root.join("H5P.Column-1.16/scripts/column.js"), "var H5P = H5P || {};\n".repeat(200))?;
    fs::write(root.join("content/größe.txt"), "unicode name".as_bytes())?;
    Ok(())
}

fn open_with_zip_crate(path: &Path) -> Result<zip::ZipArchive<fs::File>> {
    Ok(zip::ZipArchive::new(fs::File::open(path)?)?)
}

#[tokio::test]
async fn round_trip_preserves_every_file() -> Result<()> {
    let work = tempfile::tempdir()?;
    let source = work.path().join("course");
    sample_course(&source)?;
    let archive = work.path().join("course.h5p");
    let dest = work.path().join("extracted");

    let packed = pack(&source, &archive).await?;
    assert_eq!(packed.entries, 6);

    let unpacked = unpack(&archive, &dest).await?;
    assert_eq!(unpacked.entries, 6);
    assert!(!unpacked.cleaned);

    assert_eq!(snapshot(&dest)?, snapshot(&source)?);
    // Directories without files are not stored
    assert!(!dest.join("unused").exists());
    Ok(())
}

#[tokio::test]
async fn generic_zip_reader_sees_deflate_entries() -> Result<()> {
    let work = tempfile::tempdir()?;
    let source = work.path().join("course");
    sample_course(&source)?;
    let archive = work.path().join("course.h5p");
    pack(&source, &archive).await?;

    let mut zip = open_with_zip_crate(&archive)?;
    let mut names = Vec::new();
    for i in 0..zip.len() {
        let mut file = zip.by_index(i)?;
        assert_eq!(
            file.compression(),
            zip::CompressionMethod::Deflated,
            "{} is not deflated",
            file.name()
        );
        assert!(!file.name().starts_with('/'));
        assert!(!file.name().contains('\\'));
        assert!(!file.is_dir());

        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        assert_eq!(content, fs::read(source.join(file.name()))?);
        names.push(file.name().to_string());
    }

    assert_eq!(
        names,
        [
            "H5P.Column-1.16/scripts/column.js",
            "content/content.json",
            "content/empty.txt",
            "content/größe.txt",
            "content/images/pixel.png",
            "h5p.json",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn entry_names_do_not_depend_on_how_the_source_is_spelled() -> Result<()> {
    let work = tempfile::tempdir()?;
    let source = work.path().join("course");
    sample_course(&source)?;

    let plain = work.path().join("plain.h5p");
    pack(&source, &plain).await?;

    let mut spelled = work.path().join("course").join("content").join("..").into_os_string();
    spelled.push(std::path::MAIN_SEPARATOR_STR);
    let roundabout = work.path().join("roundabout.h5p");
    pack(Path::new(&spelled), &roundabout).await?;

    let names = |path: &Path| -> Result<Vec<String>> {
        let zip = open_with_zip_crate(path)?;
        Ok(zip.file_names().map(str::to_string).collect())
    };
    let mut a = names(&plain)?;
    let mut b = names(&roundabout)?;
    a.sort();
    b.sort();
    assert_eq!(a, b);
    assert!(a.contains(&"content/images/pixel.png".to_string()));
    Ok(())
}

#[tokio::test]
async fn empty_tree_round_trips_to_empty_directory() -> Result<()> {
    let work = tempfile::tempdir()?;
    let source = work.path().join("empty");
    fs::create_dir_all(source.join("only/dirs"))?;
    let archive = work.path().join("empty.h5p");

    let report = pack(&source, &archive).await?;
    assert_eq!(report.entries, 0);
    assert_eq!(open_with_zip_crate(&archive)?.len(), 0);

    let dest = work.path().join("not/yet/there");
    let report = unpack(&archive, &dest).await?;
    assert_eq!(report.entries, 0);
    assert!(dest.is_dir());
    assert_eq!(fs::read_dir(&dest)?.count(), 0);
    Ok(())
}

#[tokio::test]
async fn unpack_removes_stale_files() -> Result<()> {
    let work = tempfile::tempdir()?;
    let source = work.path().join("course");
    sample_course(&source)?;
    let archive = work.path().join("course.h5p");
    pack(&source, &archive).await?;

    let dest = work.path().join("dest");
    fs::create_dir_all(dest.join("old/deeper"))?;
    fs::write(dest.join("old.txt"), b"stale")?;
    fs::write(dest.join("old/deeper/older.txt"), b"staler")?;
    fs::write(dest.join("h5p.json"), b"outdated")?;

    let report = unpack(&archive, &dest).await?;
    assert!(report.cleaned);
    assert!(!dest.join("old.txt").exists());
    assert!(!dest.join("old").exists());
    assert_eq!(snapshot(&dest)?, snapshot(&source)?);
    Ok(())
}

#[tokio::test]
async fn unpacking_twice_gives_the_same_tree() -> Result<()> {
    let work = tempfile::tempdir()?;
    let source = work.path().join("course");
    sample_course(&source)?;
    let archive = work.path().join("course.h5p");
    pack(&source, &archive).await?;
    let dest = work.path().join("dest");

    unpack(&archive, &dest).await?;
    let first = snapshot(&dest)?;
    let report = unpack(&archive, &dest).await?;
    assert!(report.cleaned);
    assert_eq!(snapshot(&dest)?, first);
    Ok(())
}

#[tokio::test]
async fn pack_replaces_existing_destination_file() -> Result<()> {
    let work = tempfile::tempdir()?;
    let source = work.path().join("course");
    fs::create_dir_all(&source)?;
    fs::write(source.join("a.txt"), b"a")?;

    let archive = work.path().join("course.h5p");
    fs::write(&archive, vec![0xAB; 64 * 1024])?;

    pack(&source, &archive).await?;
    let mut zip = open_with_zip_crate(&archive)?;
    assert_eq!(zip.len(), 1);
    assert_eq!(zip.by_index(0)?.name(), "a.txt");
    assert!(fs::metadata(&archive)?.len() < 1024);
    Ok(())
}

#[tokio::test]
async fn failed_pack_keeps_existing_destination() -> Result<()> {
    let work = tempfile::tempdir()?;
    let archive = work.path().join("course.h5p");
    fs::write(&archive, b"previous package")?;

    let err = pack(&work.path().join("missing"), &archive).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SourceNotFound);
    assert_eq!(fs::read(&archive)?, b"previous package");
    Ok(())
}

#[tokio::test]
async fn unpacks_archives_from_other_tools() -> Result<()> {
    let work = tempfile::tempdir()?;
    let archive = work.path().join("foreign.h5p");
    {
        let mut writer = zip::ZipWriter::new(fs::File::create(&archive)?);
        let stored = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        let deflated = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        writer.add_directory("content/", stored)?;
        writer.add_directory("empty-dir/", stored)?;
        writer.start_file("h5p.json", stored)?;
        writer.write_all(b"{\"title\":\"Foreign\"}")?;
        writer.start_file("content/content.json", deflated)?;
        writer.write_all(&b"{\"text\":\"hello\"}".repeat(100))?;
        writer.finish()?;
    }

    let dest = work.path().join("dest");
    let report = unpack(&archive, &dest).await?;
    assert_eq!(report.entries, 2);
    assert_eq!(fs::read(dest.join("h5p.json"))?, b"{\"title\":\"Foreign\"}");
    assert_eq!(
        fs::read(dest.join("content/content.json"))?,
        b"{\"text\":\"hello\"}".repeat(100)
    );
    assert!(dest.join("empty-dir").is_dir());
    Ok(())
}

#[tokio::test]
async fn refuses_entries_that_escape_the_destination() -> Result<()> {
    let work = tempfile::tempdir()?;
    let archive = work.path().join("evil.h5p");
    {
        let mut writer = zip::ZipWriter::new(fs::File::create(&archive)?);
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("fine.txt", options)?;
        writer.write_all(b"ok")?;
        writer.start_file("../escaped.txt", options)?;
        writer.write_all(b"gotcha")?;
        writer.finish()?;
    }

    let dest = work.path().join("dest");
    let err = unpack(&archive, &dest).await.unwrap_err();
    assert!(matches!(err, Error::Extraction(_)));
    assert_eq!(err.kind(), ErrorKind::Extraction);
    assert!(!work.path().join("escaped.txt").exists());
    assert!(!dest.join("fine.txt").exists());
    Ok(())
}

#[tokio::test]
async fn corrupted_payload_fails_extraction() -> Result<()> {
    let work = tempfile::tempdir()?;
    let source = work.path().join("course");
    fs::create_dir_all(&source)?;
    fs::write(source.join("data.txt"), "some text to compress ".repeat(50))?;
    let archive = work.path().join("course.h5p");
    pack(&source, &archive).await?;

    // Flip a byte inside the compressed payload (local header is 30 bytes + name)
    let mut bytes = fs::read(&archive)?;
    let payload_start = 30 + "data.txt".len();
    bytes[payload_start + 2] ^= 0xFF;
    fs::write(&archive, bytes)?;

    let err = unpack(&archive, &work.path().join("dest")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Extraction);
    Ok(())
}
