use geovc_types::ObjectId;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g., `"geovc-tree-v1"`) that is
/// prepended to every hash computation. This prevents cross-type hash
/// collisions: a tree and a feature with identical bytes will produce
/// different ids.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for commit objects.
    pub const COMMIT: Self = Self::new("geovc-commit-v1");
    /// Hasher for tree objects.
    pub const TREE: Self = Self::new("geovc-tree-v1");
    /// Hasher for feature objects.
    pub const FEATURE: Self = Self::new("geovc-feature-v1");
    /// Hasher for feature type objects.
    pub const FEATURE_TYPE: Self = Self::new("geovc-featuretype-v1");
    /// Hasher for tag objects.
    pub const TAG: Self = Self::new("geovc-tag-v1");
    /// Hasher for index definition identities.
    pub const INDEX_INFO: Self = Self::new("geovc-indexinfo-v1");

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> ObjectId {
        let mut writer = self.writer();
        writer.raw(data);
        writer.finish()
    }

    /// Start an incremental hash in this domain.
    pub fn writer(&self) -> HashWriter {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        HashWriter { hasher }
    }

    /// Verify that data produces the expected object ID.
    pub fn verify(&self, data: &[u8], expected: &ObjectId) -> bool {
        self.hash(data) == *expected
    }

    /// Raw BLAKE3 hash without domain separation (for low-level use).
    pub fn raw_hash(data: &[u8]) -> [u8; 32] {
        *blake3::hash(data).as_bytes()
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Incremental hasher that length-prefixes every field, so that
/// `("ab", "c")` and `("a", "bc")` never collide.
pub struct HashWriter {
    hasher: blake3::Hasher,
}

impl HashWriter {
    /// Feed bytes verbatim, without a length prefix.
    pub fn raw(&mut self, data: &[u8]) -> &mut Self {
        self.hasher.update(data);
        self
    }

    /// Feed a length-prefixed byte field.
    pub fn field(&mut self, data: &[u8]) -> &mut Self {
        self.hasher.update(&(data.len() as u64).to_be_bytes());
        self.hasher.update(data);
        self
    }

    /// Feed a length-prefixed string field.
    pub fn str(&mut self, s: &str) -> &mut Self {
        self.field(s.as_bytes())
    }

    pub fn finish(&self) -> ObjectId {
        ObjectId::from_hash(*self.hasher.finalize().as_bytes())
    }
}
