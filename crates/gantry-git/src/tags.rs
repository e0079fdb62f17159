//! Tag operations

use git2::Oid;
use tracing::{debug, instrument};

use crate::repository::{GitRepo, Result};

impl GitRepo {
    /// Names of all tags whose commit is `rev` or one of its ancestors
    #[instrument(skip(self))]
    pub fn tags_reachable_from(&self, rev: &str) -> Result<Vec<String>> {
        let head = Oid::from_str(&self.rev_parse(rev)?)?;
        let mut names = Vec::new();

        for name in self.repo.tag_names(None)?.iter().flatten() {
            let reference = self.repo.find_reference(&format!("refs/tags/{}", name))?;
            let target = match reference.peel_to_commit() {
                Ok(commit) => commit.id(),
                // Tags on trees or blobs cannot be release tags
                Err(_) => continue,
            };
            if target == head || self.repo.graph_descendant_of(head, target)? {
                names.push(name.to_string());
            }
        }

        debug!(count = names.len(), "listed reachable tags");
        Ok(names)
    }

    /// Check whether a tag exists locally
    pub fn tag_exists(&self, name: &str) -> Result<bool> {
        Ok(self
            .repo
            .find_reference(&format!("refs/tags/{}", name))
            .is_ok())
    }

    /// Create a lightweight tag at `rev`
    pub fn create_tag(&self, name: &str, rev: &str) -> Result<()> {
        let object = self.repo.revparse_single(&self.rev_parse(rev)?)?;
        self.repo.tag_lightweight(name, &object, false)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::repository::test_support::*;

    #[test]
    fn test_tags_reachable_from() {
        let (_temp, repo) = init_repo();
        let first = repo.head_sha().unwrap();
        repo.create_tag("engine/v1.0.0", &first).unwrap();

        let second = commit_files(repo.inner(), &[("a.txt", "a")], "feat: a");
        repo.create_tag("engine/v1.1.0", &second).unwrap();

        let mut tags = repo.tags_reachable_from(&first).unwrap();
        tags.sort();
        assert_eq!(tags, vec!["engine/v1.0.0"]);

        let mut tags = repo.tags_reachable_from("HEAD").unwrap();
        tags.sort();
        assert_eq!(tags, vec!["engine/v1.0.0", "engine/v1.1.0"]);
    }

    #[test]
    fn test_tag_exists() {
        let (_temp, repo) = init_repo();
        assert!(!repo.tag_exists("v1").unwrap());
        repo.create_tag("v1", "HEAD").unwrap();
        assert!(repo.tag_exists("v1").unwrap());
    }
}
