use std::{
    fs,
    io::{self, Cursor},
    path::Path,
    time::Duration,
};

use log::info;
use reqwest::{blocking::Client, StatusCode};
use tempfile::Builder;
use zip::ZipArchive;

use crate::{config::BtsConfig, error::FetchError};

/// Fetch the raw bytes behind a url.
pub trait Transport {
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Blocking http transport.  The whole response body is kept in memory.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// With `timeout` set to `None` a stalled connection blocks forever.
    pub fn new(timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpTransport { client })
    }

    /// Client with the request timeout set in the `bts` section, if any.
    pub fn from_config(bts: &BtsConfig) -> Result<Self, reqwest::Error> {
        Self::new(bts.timeout_secs.map(Duration::from_secs))
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send()?;
        if response.status() != StatusCode::OK {
            return Err(FetchError::Transfer {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response.bytes()?.to_vec())
    }
}

/// Download the zip archive at `url` and save its first `.csv` entry as
/// `output_path`, replacing any file already there.
///
/// Entries are scanned in the order they are stored in the archive and only
/// the first one whose name ends with `.csv` is kept.  Returns `false` if the
/// archive has no such entry, in which case nothing is written.
pub fn fetch_and_extract(
    transport: &impl Transport,
    url: &str,
    output_path: &Path,
) -> Result<bool, FetchError> {
    let data = transport.get(url)?;
    extract_first_csv(data, output_path)
}

/// Same as [`fetch_and_extract`] for an archive already in memory.
pub fn extract_first_csv(data: Vec<u8>, output_path: &Path) -> Result<bool, FetchError> {
    let mut zip = ZipArchive::new(Cursor::new(data))?;
    let Some(index) = first_csv_index(&mut zip)? else {
        return Ok(false);
    };
    let mut entry = zip.by_index(index)?;

    let dir = match output_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    // stage the entry next to the target so the final rename stays on one filesystem
    let mut builder = Builder::new();
    #[cfg(unix)]
    {
        // the umask applies on open, same as a plain `File::create`
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    let mut staged = builder.tempfile_in(dir)?;
    io::copy(&mut entry, staged.as_file_mut())?;
    staged.persist(output_path).map_err(|e| e.error)?;
    info!(" -- extracted {} to {}", entry.name(), output_path.display());
    Ok(true)
}

fn first_csv_index<R: io::Read + io::Seek>(
    zip: &mut ZipArchive<R>,
) -> Result<Option<usize>, FetchError> {
    for i in 0..zip.len() {
        let file = zip.by_index_raw(i)?;
        if file.name().ends_with(".csv") {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{cell::RefCell, collections::HashMap, error::Error, io::Write};

    use zip::{write::SimpleFileOptions, ZipWriter};

    use super::*;

    /// Build an in-memory zip with the given (name, content) entries, in order.
    /// Names ending with `/` are added as directories.
    pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            if name.ends_with('/') {
                writer
                    .add_directory(*name, SimpleFileOptions::default())
                    .unwrap();
            } else {
                writer.start_file(*name, SimpleFileOptions::default()).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    /// Serves canned responses keyed by url and remembers every request.
    #[derive(Default)]
    pub struct FakeTransport {
        pub responses: HashMap<String, Result<Vec<u8>, u16>>,
        pub requested: RefCell<Vec<String>>,
    }

    impl FakeTransport {
        pub fn with(mut self, url: &str, response: Result<Vec<u8>, u16>) -> Self {
            self.responses.insert(url.to_string(), response);
            self
        }
    }

    impl Transport for FakeTransport {
        fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.requested.borrow_mut().push(url.to_string());
            match self.responses.get(url) {
                Some(Ok(data)) => Ok(data.clone()),
                Some(Err(status)) => Err(FetchError::Transfer {
                    url: url.to_string(),
                    status: *status,
                }),
                None => Err(FetchError::Transfer {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }

    const URL: &str = "https://x.org/On_Time_2020_1.zip";

    #[test]
    fn extract_csv_after_readme() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("bts_2020_1.csv");
        let transport = FakeTransport::default().with(
            URL,
            Ok(zip_bytes(&[("readme.txt", "hello"), ("data.csv", "a,b\n1,2\n")])),
        );
        assert!(fetch_and_extract(&transport, URL, &out)?);
        assert_eq!(fs::read_to_string(&out)?, "a,b\n1,2\n");
        // only the renamed csv is left behind
        let names: Vec<_> = fs::read_dir(dir.path())?
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![out.file_name().unwrap().to_owned()]);
        Ok(())
    }

    #[test]
    fn no_csv_in_archive() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("bts_2020_1.csv");
        let transport =
            FakeTransport::default().with(URL, Ok(zip_bytes(&[("readme.txt", "hello")])));
        assert!(!fetch_and_extract(&transport, URL, &out)?);
        assert!(!out.exists());
        assert_eq!(fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn first_csv_wins() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("out.csv");
        let data = zip_bytes(&[("b.csv", "first"), ("a.csv", "second")]);
        assert!(extract_first_csv(data, &out)?);
        assert_eq!(fs::read_to_string(&out)?, "first");
        Ok(())
    }

    #[test]
    fn extension_match_is_case_sensitive() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("out.csv");
        let data = zip_bytes(&[("DATA.CSV", "upper"), ("data.csv.bak", "bak")]);
        assert!(!extract_first_csv(data, &out)?);
        assert!(!out.exists());
        Ok(())
    }

    #[test]
    fn nested_entry_leaves_no_stray_files() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("bts_2020_1.csv");
        let data = zip_bytes(&[("nested/", ""), ("nested/On_Time.csv", "x,y\n")]);
        assert!(extract_first_csv(data, &out)?);
        assert_eq!(fs::read_to_string(&out)?, "x,y\n");
        assert!(!dir.path().join("nested").exists());
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn overwrite_existing_file() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("out.csv");
        fs::write(&out, "stale content that is longer")?;
        assert!(extract_first_csv(zip_bytes(&[("data.csv", "fresh")]), &out)?);
        assert_eq!(fs::read_to_string(&out)?, "fresh");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn extracted_file_has_default_permissions() -> Result<(), Box<dyn Error>> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let out = dir.path().join("out.csv");
        let plain = dir.path().join("plain.csv");
        assert!(extract_first_csv(zip_bytes(&[("data.csv", "x")]), &out)?);
        fs::write(&plain, "x")?;
        let mode = |p: &Path| -> io::Result<u32> {
            Ok(fs::metadata(p)?.permissions().mode() & 0o777)
        };
        assert_eq!(mode(&out)?, mode(&plain)?);
        Ok(())
    }

    #[test]
    fn transfer_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.csv");
        let transport = FakeTransport::default().with(URL, Err(404));
        let err = fetch_and_extract(&transport, URL, &out).unwrap_err();
        match &err {
            FetchError::Transfer { url, status } => {
                assert_eq!(url, URL);
                assert_eq!(*status, 404);
            }
            e => panic!("unexpected error {e}"),
        }
        assert_eq!(
            err.to_string(),
            format!("Failed to fetch {}, status=404", URL)
        );
        assert!(!out.exists());
    }

    #[test]
    fn not_a_zip() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.csv");
        let err = extract_first_csv(b"<html>maintenance</html>".to_vec(), &out).unwrap_err();
        assert!(matches!(err, FetchError::Archive(_)));
        assert!(!out.exists());
    }
}
