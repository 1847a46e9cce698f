// tests/integration_test.rs

//! Integration tests for deplint
//!
//! Real RPMs are built with the `rpm` crate into a temporary directory,
//! published as a local rpm-md repository and loaded through `file://` URLs.

use deplint::packages::rpm::RpmPackage;
use deplint::packages::{Dependency, PackageFormat, PackageRecord};
use deplint::repository::cache::{CacheConfig, CacheKey, MetadataCache};
use deplint::repository::{Fetcher, RepoSpec, Repository, RepositoryClient, RepositoryLoader};
use deplint::resolver::{
    arch, engine, CheckKind, Pool, EXIT_OK, EXIT_PROBLEMS, EXIT_REPOCLOSURE_PROBLEMS,
};
use deplint::version::Comparison;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// Description of a package to build
struct Spec<'a> {
    name: &'a str,
    version: &'a str,
    provides: Vec<rpm::Dependency>,
    requires: Vec<rpm::Dependency>,
    obsoletes: Vec<rpm::Dependency>,
    files: Vec<(&'a str, &'a str)>,
}

impl<'a> Spec<'a> {
    fn new(name: &'a str, version: &'a str) -> Self {
        Self {
            name,
            version,
            provides: Vec::new(),
            requires: Vec::new(),
            obsoletes: Vec::new(),
            files: Vec::new(),
        }
    }

    fn provides(mut self, cap: &str) -> Self {
        self.provides.push(rpm::Dependency::any(cap));
        self
    }

    fn requires(mut self, cap: &str) -> Self {
        self.requires.push(rpm::Dependency::any(cap));
        self
    }

    fn obsoletes(mut self, dep: rpm::Dependency) -> Self {
        self.obsoletes.push(dep);
        self
    }

    fn file(mut self, path: &'a str, content: &'a str) -> Self {
        self.files.push((path, content));
        self
    }

    /// Build `name-version-1.i386.rpm` into `dir`
    fn build(self, dir: &Path) -> PathBuf {
        let mut builder =
            rpm::PackageBuilder::new(self.name, self.version, "MIT", "i386", "test package")
                .release("1")
                .compression(rpm::CompressionType::Gzip);

        for dep in self.provides {
            builder = builder.provides(dep);
        }
        for dep in self.requires {
            builder = builder.requires(dep);
        }
        for dep in self.obsoletes {
            builder = builder.obsoletes(dep);
        }

        let sources = dir.join(format!("{}-{}-src", self.name, self.version));
        fs::create_dir_all(&sources).unwrap();
        for (idx, (path, content)) in self.files.iter().enumerate() {
            let source = sources.join(idx.to_string());
            fs::write(&source, content).unwrap();
            builder = builder
                .with_file(&source, rpm::FileOptions::new(*path))
                .unwrap();
        }

        let package = builder.build().unwrap();
        let out = dir.join(format!("{}-{}-1.i386.rpm", self.name, self.version));
        let mut file = fs::File::create(&out).unwrap();
        package.write(&mut file).unwrap();
        out
    }
}

fn read(path: &Path) -> PackageRecord {
    RpmPackage::parse(path.to_str().unwrap()).unwrap().to_record()
}

fn flags(op: Comparison) -> &'static str {
    match op {
        Comparison::Equal => "EQ",
        Comparison::Less => "LT",
        Comparison::Greater => "GT",
        Comparison::LessOrEqual => "LE",
        Comparison::GreaterOrEqual => "GE",
    }
}

fn entries(tag: &str, deps: &[Dependency]) -> String {
    let mut xml = format!("<rpm:{}>", tag);
    for dep in deps {
        match &dep.constraint {
            Some(c) => xml.push_str(&format!(
                r#"<rpm:entry name="{}" flags="{}" epoch="{}" ver="{}" rel="{}"/>"#,
                dep.name,
                flags(c.op),
                c.version.epoch,
                c.version.version,
                c.version.release.as_deref().unwrap_or("")
            )),
            None => xml.push_str(&format!(r#"<rpm:entry name="{}"/>"#, dep.name)),
        }
    }
    xml.push_str(&format!("</rpm:{}>", tag));
    xml
}

fn gzip(text: &str) -> Vec<u8> {
    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    gz.write_all(text.as_bytes()).unwrap();
    gz.finish().unwrap()
}

/// Published location of a document, named after its checksum
struct Published {
    checksum: String,
    location: String,
}

fn publish(repo_dir: &Path, kind: &str, xml: &str) -> Published {
    let bytes = gzip(xml);
    let checksum = format!("{:x}", Sha256::digest(&bytes));
    let location = format!("repodata/{}-{}.xml.gz", checksum, kind);
    fs::write(repo_dir.join(&location), bytes).unwrap();
    Published { checksum, location }
}

/// Build the given packages into an rpm-md repository at `repo_dir`
fn make_repo(repo_dir: &Path, specs: Vec<Spec<'_>>) {
    let packages_dir = repo_dir.join("Packages");
    fs::create_dir_all(&packages_dir).unwrap();
    fs::create_dir_all(repo_dir.join("repodata")).unwrap();

    let mut primary = String::from(r#"<metadata xmlns="http://linux.duke.edu/metadata/common" xmlns:rpm="http://linux.duke.edu/metadata/rpm">"#);
    let mut filelists = String::from(r#"<filelists xmlns="http://linux.duke.edu/metadata/filelists">"#);

    for spec in specs {
        let rpm_path = spec.build(&packages_dir);
        let record = read(&rpm_path);
        let file_name = rpm_path.file_name().unwrap().to_string_lossy().to_string();
        let version = format!(
            r#"<version epoch="{}" ver="{}" rel="{}"/>"#,
            record.evr.epoch,
            record.evr.version,
            record.evr.release.as_deref().unwrap_or("")
        );

        primary.push_str(&format!(
            r#"<package type="rpm"><name>{}</name><arch>{}</arch>{}<location href="Packages/{}"/><format>{}{}{}{}</format></package>"#,
            record.name,
            record.arch,
            version,
            file_name,
            entries("provides", &record.provides),
            entries("requires", &record.requires),
            entries("obsoletes", &record.obsoletes),
            entries("conflicts", &record.conflicts),
        ));

        filelists.push_str(&format!(
            r#"<package pkgid="x" name="{}" arch="{}">{}"#,
            record.name, record.arch, version
        ));
        for file in &record.files {
            filelists.push_str(&format!("<file>{}</file>", file.path));
        }
        filelists.push_str("</package>");
    }
    primary.push_str("</metadata>");
    filelists.push_str("</filelists>");

    let primary = publish(repo_dir, "primary", &primary);
    let filelists = publish(repo_dir, "filelists", &filelists);
    let repomd = format!(
        r#"<repomd xmlns="http://linux.duke.edu/metadata/repo">
<data type="primary"><checksum type="sha256">{}</checksum><location href="{}"/></data>
<data type="filelists"><checksum type="sha256">{}</checksum><location href="{}"/></data>
</repomd>"#,
        primary.checksum, primary.location, filelists.checksum, filelists.location
    );
    fs::write(repo_dir.join("repodata/repomd.xml"), repomd).unwrap();
}

/// Fetcher counting every request it forwards
struct CountingFetcher {
    inner: RepositoryClient,
    requests: AtomicUsize,
}

impl CountingFetcher {
    fn new() -> Self {
        Self {
            inner: RepositoryClient::new().unwrap(),
            requests: AtomicUsize::new(0),
        }
    }

    fn count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Fetcher for CountingFetcher {
    fn get(&self, url: &str) -> deplint::Result<Vec<u8>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.inner.get(url)
    }
}

fn repo_spec(name: &str, dir: &Path) -> RepoSpec {
    format!("{},file://{}", name, dir.display()).parse().unwrap()
}

fn cache_in(dir: &Path) -> MetadataCache {
    MetadataCache::new(CacheConfig::new(dir, Duration::from_secs(3 * 60 * 60)))
}

/// Load repositories and run a check the way the binary does
fn run_check(
    kind: CheckKind,
    repos: &[RepoSpec],
    under_test: &[PackageRecord],
    cache: &MetadataCache,
) -> (String, u8) {
    let client = RepositoryClient::new().unwrap();
    let loader = RepositoryLoader::new(&client, cache);
    let target = arch::resolve_target_arch(None, under_test).unwrap();

    let mut loaded: Vec<Repository> = loader.load_all(repos).unwrap();
    if kind.needs_file_digests() {
        loader
            .resolve_file_digests(&mut loaded, under_test, |p| {
                arch::is_compatible(&target, &p.arch)
            })
            .unwrap();
    }

    let pool = Pool::build(&loaded, under_test);
    let pool = arch::filter_compatible(&pool, &target);
    let report = engine::run(kind, &pool);
    (report.render(), kind.exit_code(&report))
}

#[test]
fn test_finds_all_problems() {
    let work = TempDir::new().unwrap();
    let repo_dir = work.path().join("base");
    make_repo(
        &repo_dir,
        vec![
            Spec::new("a", "5.0"),
            Spec::new("b", "0.1").file("/usr/share/thing", "content\n"),
            Spec::new("c", "0.1").provides("libfoo.so.4"),
            Spec::new("d", "0.1").requires("libfoo.so.4"),
        ],
    );

    let under_test: Vec<PackageRecord> = vec![
        Spec::new("a", "4.0"),
        Spec::new("e", "1.0").requires("doesnotexist"),
        Spec::new("f", "0.1").file("/usr/share/thing", "different content\n"),
        Spec::new("c", "0.2").provides("libfoo.so.5"),
    ]
    .into_iter()
    .map(|spec| read(&spec.build(work.path())))
    .collect();

    let cache_dir = TempDir::new().unwrap();
    let (report, code) = run_check(
        CheckKind::Full,
        &[repo_spec("base", &repo_dir)],
        &under_test,
        &cache_in(cache_dir.path()),
    );

    assert_eq!(
        report,
        "Problems with dependency set:\n\
         nothing provides doesnotexist needed by e-1.0-1.i386\n\
         Dependency problems with repos:\n\
         nothing provides libfoo.so.4 needed by d-0.1-1.i386\n\
         Undeclared file conflicts:\n\
         f-0.1-1.i386 provides /usr/share/thing which is also provided by b-0.1-1.i386\n\
         Upgrade problems:\n\
         a-4.0-1.i386 would be upgraded by a-5.0-1.i386 from repo base\n"
    );
    assert_eq!(code, EXIT_PROBLEMS);
}

#[test]
fn test_identical_file_content_is_not_a_conflict() {
    let work = TempDir::new().unwrap();
    let repo_dir = work.path().join("base");
    make_repo(
        &repo_dir,
        vec![Spec::new("b", "0.1").file("/usr/share/thing", "content\n")],
    );
    let under_test = vec![read(
        &Spec::new("f", "0.1")
            .file("/usr/share/thing", "content\n")
            .build(work.path()),
    )];

    let cache_dir = TempDir::new().unwrap();
    let (report, code) = run_check(
        CheckKind::Conflicts,
        &[repo_spec("base", &repo_dir)],
        &under_test,
        &cache_in(cache_dir.path()),
    );
    assert_eq!(report, "");
    assert_eq!(code, EXIT_OK);
}

#[test]
fn test_repoclosure_catches_soname_change_with_package_rename() {
    let work = TempDir::new().unwrap();
    let repo_dir = work.path().join("base");
    make_repo(
        &repo_dir,
        vec![
            Spec::new("foolib", "4.0").provides("libfoo.so.4"),
            Spec::new("b", "0.1").requires("libfoo.so.4"),
        ],
    );
    let under_test = vec![read(
        &Spec::new("libfoo", "5.0")
            .provides("libfoo.so.5")
            .obsoletes(rpm::Dependency::less("foolib", "5.0-1"))
            .build(work.path()),
    )];

    let cache_dir = TempDir::new().unwrap();
    let (report, code) = run_check(
        CheckKind::Repoclosure,
        &[repo_spec("base", &repo_dir)],
        &under_test,
        &cache_in(cache_dir.path()),
    );
    assert_eq!(
        report,
        "Dependency problems with repos:\nnothing provides libfoo.so.4 needed by b-0.1-1.i386\n"
    );
    assert_eq!(code, EXIT_REPOCLOSURE_PROBLEMS);
}

#[test]
fn test_repoclosure_ignores_problems_in_packages_under_test() {
    let work = TempDir::new().unwrap();
    let repo_dir = work.path().join("base");
    make_repo(&repo_dir, vec![Spec::new("b", "0.1")]);
    let under_test = vec![read(
        &Spec::new("a", "0.1")
            .requires("doesnotexist")
            .build(work.path()),
    )];

    let cache_dir = TempDir::new().unwrap();
    let (report, code) = run_check(
        CheckKind::Repoclosure,
        &[repo_spec("base", &repo_dir)],
        &under_test,
        &cache_in(cache_dir.path()),
    );
    assert_eq!(report, "");
    assert_eq!(code, EXIT_OK);
}

#[test]
fn test_shadowed_repository_package_is_never_downloaded() {
    let work = TempDir::new().unwrap();
    let repo_dir = work.path().join("base");
    make_repo(
        &repo_dir,
        vec![Spec::new("tool", "1.0").file("/usr/bin/tool", "old build\n")],
    );
    // Only the metadata is published; the superseded package file is gone
    fs::remove_file(repo_dir.join("Packages/tool-1.0-1.i386.rpm")).unwrap();

    let under_test = vec![read(
        &Spec::new("tool", "2.0")
            .file("/usr/bin/tool", "new build\n")
            .build(work.path()),
    )];

    let cache_dir = TempDir::new().unwrap();
    let (report, code) = run_check(
        CheckKind::Full,
        &[repo_spec("base", &repo_dir)],
        &under_test,
        &cache_in(cache_dir.path()),
    );
    assert_eq!(report, "");
    assert_eq!(code, EXIT_OK);
}

#[test]
fn test_cache_is_used_when_available() {
    let work = TempDir::new().unwrap();
    let repo_dir = work.path().join("base");
    make_repo(&repo_dir, vec![Spec::new("a", "0.1")]);

    let cache_dir = TempDir::new().unwrap();
    let cache = cache_in(cache_dir.path());
    let fetcher = CountingFetcher::new();
    let loader = RepositoryLoader::new(&fetcher, &cache);
    let spec = repo_spec("base", &repo_dir);

    loader.load(&spec).unwrap();
    // repomd.xml, primary and filelists
    assert_eq!(fetcher.count(), 3);

    let repo = loader.load(&spec).unwrap();
    // Only repomd.xml is fetched again
    assert_eq!(fetcher.count(), 4);
    assert_eq!(repo.packages[0].nevra(), "a-0.1-1.i386");
}

#[test]
fn test_cache_does_not_grow_unboundedly() {
    let work = TempDir::new().unwrap();
    let first_dir = work.path().join("first");
    let second_dir = work.path().join("second");
    make_repo(&first_dir, vec![Spec::new("a", "0.1")]);
    make_repo(&second_dir, vec![Spec::new("b", "0.1")]);

    let cache_dir = TempDir::new().unwrap();
    let cache = MetadataCache::new(CacheConfig::new(cache_dir.path(), Duration::from_secs(1)));
    let client = RepositoryClient::new().unwrap();
    let loader = RepositoryLoader::new(&client, &cache);

    let cached_paths = |repo_dir: &Path| -> Vec<PathBuf> {
        fs::read_dir(repo_dir.join("repodata"))
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|name| name.ends_with(".xml.gz"))
            .map(|name| {
                let (checksum, rest) = name.split_once('-').unwrap();
                let kind = rest.trim_end_matches(".xml.gz");
                let location = format!("repodata/{}", name);
                cache.entry_path(&CacheKey::new(checksum, kind, &location).unwrap())
            })
            .collect()
    };

    loader.load(&repo_spec("base", &first_dir)).unwrap();
    let first = cached_paths(&first_dir);
    assert_eq!(first.len(), 2);
    assert!(first.iter().all(|p| p.exists()));

    // The next invocation starts after the TTL has elapsed
    cache.sweep_expired(SystemTime::now() + Duration::from_secs(10));
    loader.load(&repo_spec("base", &second_dir)).unwrap();

    assert!(first.iter().all(|p| !p.exists()));
    assert!(cached_paths(&second_dir).iter().all(|p| p.exists()));
}

#[test]
fn test_unreachable_repository_is_setup_error() {
    let cache_dir = TempDir::new().unwrap();
    let cache = cache_in(cache_dir.path());
    let client = RepositoryClient::new().unwrap();
    let loader = RepositoryLoader::new(&client, &cache);

    let missing = repo_spec("gone", &cache_dir.path().join("does-not-exist"));
    assert!(matches!(
        loader.load_all(&[missing]),
        Err(deplint::Error::DownloadError(_))
    ));
}

#[test]
fn test_list_deps() {
    let work = TempDir::new().unwrap();
    let repo_dir = work.path().join("base");
    make_repo(
        &repo_dir,
        vec![
            Spec::new("glibc", "2.38").provides("libc.so.6"),
            Spec::new("bash", "5.2").file("/usr/bin/sh", "#!sh\n"),
        ],
    );
    let under_test = vec![read(
        &Spec::new("tool", "1.0")
            .requires("libc.so.6")
            .requires("/usr/bin/sh")
            .build(work.path()),
    )];

    let cache_dir = TempDir::new().unwrap();
    let cache = cache_in(cache_dir.path());
    let client = RepositoryClient::new().unwrap();
    let loader = RepositoryLoader::new(&client, &cache);
    let repos = loader.load_all(&[repo_spec("base", &repo_dir)]).unwrap();

    let pool = Pool::build(&repos, &under_test);
    let deps = engine::list_deps(&pool);
    assert_eq!(deps.len(), 1);
    assert_eq!(
        deps[0].1,
        vec!["bash-5.2-1.i386".to_string(), "glibc-2.38-1.i386".to_string()]
    );
}
