use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Offset as _};
use git2::{BranchType, ErrorCode, ObjectType, Oid, Repository, Sort, TreeWalkMode, TreeWalkResult};

use crate::foundation::error::{ChronoError, ChronoResult};
use crate::history::snapshot::{CommitInfo, FileContent, SHORT_HASH_LEN, Snapshot};

/// Conventional default branch names; a request for one retries the other.
const DEFAULT_BRANCH_PAIRS: [(&str, &str); 2] = [("main", "master"), ("master", "main")];

/// Read-only view over a local git repository's history.
pub struct HistoryReader {
    repo: Repository,
    path: PathBuf,
}

impl std::fmt::Debug for HistoryReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryReader")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl HistoryReader {
    /// Open the repository rooted at `path`.
    pub fn open(path: impl AsRef<Path>) -> ChronoResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ChronoError::repository(format!(
                "the path '{}' does not exist",
                path.display()
            )));
        }
        let repo = Repository::open(path).map_err(|e| {
            ChronoError::repository(format!(
                "'{}' is not a valid git repository: {}",
                path.display(),
                e.message()
            ))
        })?;
        Ok(Self {
            repo,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the checked-out branch, or `None` for a detached or unborn HEAD.
    pub fn active_branch(&self) -> Option<String> {
        let head = self.repo.head().ok()?;
        if !head.is_branch() {
            return None;
        }
        head.shorthand().map(str::to_owned)
    }

    /// Local branch names in lexicographic order.
    pub fn list_branches(&self) -> ChronoResult<Vec<String>> {
        let mut names = BTreeSet::new();
        for branch in self.repo.branches(Some(BranchType::Local))? {
            let (branch, _) = branch?;
            if let Some(name) = branch.name()? {
                names.insert(name.to_owned());
            }
        }
        Ok(names.into_iter().collect())
    }

    /// Commits reachable from `branch` (or HEAD), oldest first.
    ///
    /// Parents always precede children; among unrelated commits, older commit time wins.
    /// An unborn HEAD yields an empty history rather than an error.
    #[tracing::instrument(skip(self), fields(repo = %self.path.display()))]
    pub fn list_history(&self, branch: Option<&str>) -> ChronoResult<Vec<CommitInfo>> {
        let Some(tip) = self.resolve_tip(branch)? else {
            return Ok(Vec::new());
        };

        let mut walk = self.repo.revwalk()?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME | Sort::REVERSE)?;
        walk.push(tip)?;

        let mut history = Vec::new();
        for oid in walk {
            let commit = self.repo.find_commit(oid?)?;
            history.push(commit_info(&commit)?);
        }
        tracing::debug!(commits = history.len(), "history listed");
        Ok(history)
    }

    /// Every tracked file at `commit_id`, keyed by repository-relative path.
    ///
    /// Undecodable content is recorded as [`FileContent::Binary`], never an error.
    pub fn snapshot_at(&self, commit_id: &str) -> ChronoResult<Snapshot> {
        let oid = Oid::from_str(commit_id)?;
        let tree = self.repo.find_commit(oid)?.tree()?;

        let mut files = Snapshot::new();
        let mut read_err: Option<git2::Error> = None;
        let walked = tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            // Submodule links and subtrees carry no content of their own.
            if entry.kind() != Some(ObjectType::Blob) {
                return TreeWalkResult::Ok;
            }
            match self.repo.find_blob(entry.id()) {
                Ok(blob) => {
                    let name = String::from_utf8_lossy(entry.name_bytes());
                    files.insert(format!("{root}{name}"), FileContent::from_bytes(blob.content()));
                    TreeWalkResult::Ok
                }
                Err(e) => {
                    read_err = Some(e);
                    TreeWalkResult::Abort
                }
            }
        });
        if let Some(e) = read_err {
            return Err(e.into());
        }
        walked?;

        Ok(files)
    }

    fn resolve_tip(&self, branch: Option<&str>) -> ChronoResult<Option<Oid>> {
        let Some(name) = branch else {
            return match self.repo.head() {
                Ok(head) => Ok(Some(head.peel_to_commit()?.id())),
                Err(e) if e.code() == ErrorCode::UnbornBranch => Ok(None),
                Err(e) => Err(e.into()),
            };
        };

        if let Some(oid) = self.lookup_rev(name)? {
            return Ok(Some(oid));
        }

        let alternate = DEFAULT_BRANCH_PAIRS
            .iter()
            .find(|(requested, _)| *requested == name)
            .map(|(_, alt)| *alt);
        match alternate {
            Some(alt) => {
                if let Some(oid) = self.lookup_rev(alt)? {
                    tracing::info!(requested = name, using = alt, "branch missing, using alternate default");
                    return Ok(Some(oid));
                }
                Err(ChronoError::branch_not_found(format!(
                    "could not find branch '{name}' or '{alt}'; please specify a branch"
                )))
            }
            None => Err(ChronoError::branch_not_found(format!(
                "could not find branch '{name}'"
            ))),
        }
    }

    fn lookup_rev(&self, name: &str) -> ChronoResult<Option<Oid>> {
        if let Ok(branch) = self.repo.find_branch(name, BranchType::Local) {
            return Ok(Some(branch.get().peel_to_commit()?.id()));
        }
        match self.repo.revparse_single(name) {
            Ok(obj) => Ok(obj.peel_to_commit().ok().map(|c| c.id())),
            Err(_) => Ok(None),
        }
    }
}

fn commit_info(commit: &git2::Commit<'_>) -> ChronoResult<CommitInfo> {
    let id = commit.id().to_string();
    let author = commit.author();
    let when = commit.time();

    let offset =
        FixedOffset::east_opt(when.offset_minutes() * 60).unwrap_or_else(|| chrono::Utc.fix());
    let time = DateTime::from_timestamp(when.seconds(), 0)
        .ok_or_else(|| {
            ChronoError::repository(format!("commit {id} has an out-of-range timestamp"))
        })?
        .with_timezone(&offset);

    Ok(CommitInfo {
        hash: id.chars().take(SHORT_HASH_LEN).collect(),
        author_name: String::from_utf8_lossy(author.name_bytes()).into_owned(),
        author_email: String::from_utf8_lossy(author.email_bytes()).into_owned(),
        time,
        message: String::from_utf8_lossy(commit.message_bytes())
            .trim()
            .to_owned(),
        id,
    })
}

#[cfg(test)]
#[path = "../../tests/unit/history/repo.rs"]
mod tests;
