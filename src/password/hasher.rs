//! 密码哈希实现
//!
//! 提供密码哈希和验证的核心功能。salt 取自注入的 [`RandomSource`]。

use std::sync::Arc;

#[cfg(feature = "argon2")]
use argon2::password_hash::{
    self, PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
};
#[cfg(feature = "argon2")]
use argon2::{Argon2, Params, Version};

use tracing::{debug, warn};

use crate::config::DEFAULT_MIN_PASSWORD_LENGTH;
use crate::error::{Error, PasswordHashError, Result, ValidationError};
use crate::random::{OsRandomSource, RandomSource};

/// salt 字节数
const SALT_LENGTH: usize = 16;

/// 支持的哈希算法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Argon2id - 推荐的默认算法
    /// 结合了 Argon2i（抵抗侧信道攻击）和 Argon2d（抵抗 GPU 攻击）的优点
    #[cfg(feature = "argon2")]
    Argon2id,

    /// bcrypt - 经典算法，广泛支持
    #[cfg(feature = "bcrypt")]
    Bcrypt,
}

// 编译时检查：至少需要启用一个密码哈希算法
#[cfg(not(any(feature = "argon2", feature = "bcrypt")))]
compile_error!(
    "At least one password hashing algorithm (argon2 or bcrypt) must be enabled. Enable one of the password hashing features."
);

#[allow(clippy::derivable_impls)]
impl Default for Algorithm {
    fn default() -> Self {
        #[cfg(feature = "argon2")]
        {
            Algorithm::Argon2id
        }
        #[cfg(all(not(feature = "argon2"), feature = "bcrypt"))]
        {
            Algorithm::Bcrypt
        }
    }
}

/// Argon2id 代价参数
#[cfg(feature = "argon2")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argon2Params {
    /// 内存开销（KiB）
    pub memory_kib: u32,
    /// 迭代次数
    pub iterations: u32,
    /// 并行度
    pub parallelism: u32,
}

#[cfg(feature = "argon2")]
impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

#[cfg(feature = "argon2")]
impl Argon2Params {
    fn to_params(self) -> Result<Params> {
        Params::new(self.memory_kib, self.iterations, self.parallelism, None).map_err(|e| {
            Error::PasswordHash(PasswordHashError::HashFailed(format!(
                "invalid Argon2 parameters: {}",
                e
            )))
        })
    }
}

/// 凭证哈希器
///
/// 无内部可变状态，可以通过 `Arc` 在请求之间共享。
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    /// 使用的哈希算法
    algorithm: Algorithm,

    /// 密码最小长度（字符数）
    min_password_length: usize,

    /// salt 来源
    random: Arc<dyn RandomSource>,

    /// Argon2id 代价参数
    #[cfg(feature = "argon2")]
    argon2_params: Argon2Params,

    /// bcrypt 的 cost 参数 (4-31, 默认 12)
    #[cfg(feature = "bcrypt")]
    bcrypt_cost: u32,
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_PASSWORD_LENGTH, Arc::new(OsRandomSource))
    }
}

impl CredentialHasher {
    /// 创建新的凭证哈希器
    ///
    /// # Arguments
    ///
    /// * `min_password_length` - 明文密码的最小字符数
    /// * `random` - salt 的随机来源
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use commerce_auth::password::CredentialHasher;
    /// use commerce_auth::random::OsRandomSource;
    ///
    /// let hasher = CredentialHasher::new(8, Arc::new(OsRandomSource));
    /// assert!(hasher.hash("short").is_err());
    /// ```
    pub fn new(min_password_length: usize, random: Arc<dyn RandomSource>) -> Self {
        Self {
            algorithm: Algorithm::default(),
            min_password_length,
            random,
            #[cfg(feature = "argon2")]
            argon2_params: Argon2Params::default(),
            #[cfg(feature = "bcrypt")]
            bcrypt_cost: 12,
        }
    }

    /// 设置哈希算法
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// 设置 Argon2id 代价参数
    #[cfg(feature = "argon2")]
    pub fn with_argon2_params(mut self, params: Argon2Params) -> Self {
        self.argon2_params = params;
        self
    }

    /// 设置 bcrypt 的 cost 参数
    ///
    /// # Arguments
    ///
    /// * `cost` - cost 参数，范围 4-31，默认 12
    ///
    /// # Panics
    ///
    /// 如果 cost 不在 4-31 范围内会 panic
    #[cfg(feature = "bcrypt")]
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        assert!(
            (4..=31).contains(&cost),
            "bcrypt cost must be between 4 and 31"
        );
        self.bcrypt_cost = cost;
        self
    }

    /// 当前算法
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// 密码最小长度
    pub fn min_password_length(&self) -> usize {
        self.min_password_length
    }

    /// 哈希密码
    ///
    /// 密码短于最小长度时返回 [`ValidationError::PasswordTooShort`]，不会进行哈希。
    ///
    /// # Example
    ///
    /// ```rust
    /// use commerce_auth::password::CredentialHasher;
    ///
    /// let hasher = CredentialHasher::default();
    /// let hash = hasher.hash("longenoughpassword").unwrap();
    /// # #[cfg(feature = "argon2")]
    /// assert!(hash.starts_with("$argon2id$"));
    /// ```
    pub fn hash(&self, password: &str) -> Result<String> {
        let actual = password.chars().count();
        if actual < self.min_password_length {
            return Err(Error::Validation(ValidationError::PasswordTooShort {
                min_length: self.min_password_length,
                actual,
            }));
        }

        let mut salt = [0u8; SALT_LENGTH];
        self.random.fill_bytes(&mut salt)?;

        let hash = match self.algorithm {
            #[cfg(feature = "argon2")]
            Algorithm::Argon2id => self.hash_argon2(password, &salt)?,
            #[cfg(feature = "bcrypt")]
            Algorithm::Bcrypt => self.hash_bcrypt(password, salt)?,
        };

        debug!(algorithm = ?self.algorithm, "password hashed");
        Ok(hash)
    }

    /// 验证密码
    ///
    /// 根据哈希前缀自动选择算法。密码错误返回 [`PasswordHashError::Mismatch`]；
    /// 存储的哈希无法解析或算法未知返回 [`PasswordHashError::InvalidFormat`]。
    ///
    /// # Example
    ///
    /// ```rust
    /// use commerce_auth::password::CredentialHasher;
    ///
    /// let hasher = CredentialHasher::default();
    /// let hash = hasher.hash("my_password").unwrap();
    ///
    /// assert!(hasher.verify("my_password", &hash).is_ok());
    /// assert!(hasher.verify("wrong_password", &hash).is_err());
    /// ```
    pub fn verify(&self, password: &str, hash: &str) -> Result<()> {
        let result = self.verify_inner(password, hash);
        if let Err(Error::PasswordHash(PasswordHashError::InvalidFormat(reason))) = &result {
            warn!(target: "security", reason = %reason, "stored password hash is malformed");
        }
        result
    }

    fn verify_inner(&self, password: &str, hash: &str) -> Result<()> {
        #[cfg(feature = "argon2")]
        if hash.starts_with("$argon2") {
            return verify_argon2(password, hash);
        }
        #[cfg(feature = "bcrypt")]
        if hash.starts_with("$2") {
            return verify_bcrypt(password, hash);
        }
        Err(Error::PasswordHash(PasswordHashError::InvalidFormat(
            "unknown hash format".to_string(),
        )))
    }

    /// 检查哈希是否需要重新生成
    ///
    /// 存储的哈希使用了其他算法或比当前配置更弱的参数时返回 `true`，
    /// 调用方可以在下一次成功登录后重新哈希。
    pub fn needs_rehash(&self, hash: &str) -> bool {
        match self.algorithm {
            #[cfg(feature = "argon2")]
            Algorithm::Argon2id => {
                if !hash.starts_with("$argon2id$") {
                    return true;
                }
                let Ok(parsed) = PasswordHash::new(hash) else {
                    return true;
                };
                let Ok(params) = Params::try_from(&parsed) else {
                    return true;
                };
                params.m_cost() < self.argon2_params.memory_kib
                    || params.t_cost() < self.argon2_params.iterations
                    || params.p_cost() < self.argon2_params.parallelism
            }
            #[cfg(feature = "bcrypt")]
            Algorithm::Bcrypt => {
                if !hash.starts_with("$2") {
                    return true;
                }
                // 检查 cost 是否匹配
                if let Some(cost_str) = hash.get(4..6)
                    && let Ok(cost) = cost_str.parse::<u32>()
                {
                    return cost < self.bcrypt_cost;
                }
                true
            }
        }
    }

    // ========================================================================
    // Argon2 实现
    // ========================================================================

    #[cfg(feature = "argon2")]
    fn hash_argon2(&self, password: &str, salt: &[u8]) -> Result<String> {
        let salt = SaltString::encode_b64(salt).map_err(|e| {
            Error::PasswordHash(PasswordHashError::HashFailed(format!(
                "Failed to encode salt: {}",
                e
            )))
        })?;
        let argon2 = Argon2::new(
            argon2::Algorithm::Argon2id,
            Version::V0x13,
            self.argon2_params.to_params()?,
        );

        argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| {
                Error::PasswordHash(PasswordHashError::HashFailed(format!(
                    "Argon2 hash failed: {}",
                    e
                )))
            })
    }

    // ========================================================================
    // bcrypt 实现
    // ========================================================================

    #[cfg(feature = "bcrypt")]
    fn hash_bcrypt(&self, password: &str, salt: [u8; SALT_LENGTH]) -> Result<String> {
        bcrypt::hash_with_salt(password, self.bcrypt_cost, salt)
            .map(|parts| parts.format_for_version(bcrypt::Version::TwoB))
            .map_err(|e| {
                Error::PasswordHash(PasswordHashError::HashFailed(format!(
                    "bcrypt hash failed: {}",
                    e
                )))
            })
    }
}

#[cfg(feature = "argon2")]
fn verify_argon2(password: &str, hash: &str) -> Result<()> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| {
        Error::PasswordHash(PasswordHashError::InvalidFormat(format!(
            "invalid Argon2 hash: {}",
            e
        )))
    })?;

    // 参数取自哈希本身
    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(()),
        Err(password_hash::Error::Password) => {
            Err(Error::PasswordHash(PasswordHashError::Mismatch))
        }
        Err(e) => Err(Error::PasswordHash(PasswordHashError::InvalidFormat(
            format!("invalid Argon2 hash: {}", e),
        ))),
    }
}

#[cfg(feature = "bcrypt")]
fn verify_bcrypt(password: &str, hash: &str) -> Result<()> {
    match bcrypt::verify(password, hash) {
        Ok(true) => Ok(()),
        Ok(false) => Err(Error::PasswordHash(PasswordHashError::Mismatch)),
        Err(e) => Err(Error::PasswordHash(PasswordHashError::InvalidFormat(
            format!("bcrypt verify failed: {}", e),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::SeededRandomSource;

    #[derive(Debug)]
    struct FailingRandom;

    impl RandomSource for FailingRandom {
        fn fill_bytes(&self, _dest: &mut [u8]) -> Result<()> {
            Err(Error::Crypto(crate::error::CryptoError::RngFailed(
                "entropy exhausted".into(),
            )))
        }
    }

    /// 降低代价参数以加快测试
    fn fast_hasher() -> CredentialHasher {
        let hasher = CredentialHasher::new(8, Arc::new(OsRandomSource));
        #[cfg(feature = "argon2")]
        let hasher = hasher.with_argon2_params(Argon2Params {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        });
        hasher
    }

    #[test]
    fn test_short_password_rejected() {
        let hasher = fast_hasher();
        let err = hasher.hash("short").unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::PasswordTooShort {
                min_length: 8,
                actual: 5
            })
        ));
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = fast_hasher();
        let hash = hasher.hash("longenoughpassword").unwrap();

        assert!(hasher.verify("longenoughpassword", &hash).is_ok());
        assert!(matches!(
            hasher.verify("wrongpassword", &hash),
            Err(Error::PasswordHash(PasswordHashError::Mismatch))
        ));
    }

    #[test]
    #[cfg(feature = "argon2")]
    fn test_argon2_params_embedded() {
        let hasher = fast_hasher();
        let hash = hasher.hash("test_password_123").unwrap();
        assert!(hash.starts_with("$argon2id$v=19$m=1024,t=1,p=1$"));
    }

    #[test]
    #[cfg(feature = "bcrypt")]
    fn test_bcrypt_hash_and_verify() {
        let hasher = fast_hasher()
            .with_algorithm(Algorithm::Bcrypt)
            .with_bcrypt_cost(4); // 使用低 cost 加快测试
        let password = "test_password_123";

        let hash = hasher.hash(password).unwrap();
        assert!(hash.starts_with("$2b$04$"));

        assert!(hasher.verify(password, &hash).is_ok());
        assert!(matches!(
            hasher.verify("wrong_password", &hash),
            Err(Error::PasswordHash(PasswordHashError::Mismatch))
        ));
    }

    #[test]
    fn test_malformed_hash_is_distinct_from_mismatch() {
        let hasher = fast_hasher();

        assert!(matches!(
            hasher.verify("longenoughpassword", "invalid_hash"),
            Err(Error::PasswordHash(PasswordHashError::InvalidFormat(_)))
        ));

        #[cfg(feature = "argon2")]
        assert!(matches!(
            hasher.verify("longenoughpassword", "$argon2id$garbage"),
            Err(Error::PasswordHash(PasswordHashError::InvalidFormat(_)))
        ));
    }

    #[test]
    fn test_rng_failure_propagates() {
        let hasher = CredentialHasher::new(8, Arc::new(FailingRandom));
        assert!(matches!(
            hasher.hash("longenoughpassword"),
            Err(Error::Crypto(crate::error::CryptoError::RngFailed(_)))
        ));
    }

    #[test]
    fn test_seeded_salt_is_deterministic() {
        let a = CredentialHasher {
            random: Arc::new(SeededRandomSource::new(9)),
            ..fast_hasher()
        };
        let b = CredentialHasher {
            random: Arc::new(SeededRandomSource::new(9)),
            ..fast_hasher()
        };

        assert_eq!(
            a.hash("longenoughpassword").unwrap(),
            b.hash("longenoughpassword").unwrap()
        );
    }

    #[test]
    fn test_different_hashes_same_password() {
        let hasher = fast_hasher();
        let password = "same_password";

        let hash1 = hasher.hash(password).unwrap();
        let hash2 = hasher.hash(password).unwrap();

        // 由于 salt 不同，同一密码每次生成的哈希应该不同
        assert_ne!(hash1, hash2);

        // 但两个哈希都应该能验证成功
        assert!(hasher.verify(password, &hash1).is_ok());
        assert!(hasher.verify(password, &hash2).is_ok());
    }

    #[test]
    fn test_unicode_password_length_counts_characters() {
        let hasher = fast_hasher();
        // 8 个字符，超过 8 个字节
        let password = "密码测试密码测试";

        let hash = hasher.hash(password).unwrap();
        assert!(hasher.verify(password, &hash).is_ok());
        assert!(hasher.hash("密码测试").is_err());
    }

    #[test]
    #[cfg(feature = "argon2")]
    fn test_needs_rehash_argon2() {
        let weak = fast_hasher();
        let hash = weak.hash("longenoughpassword").unwrap();
        assert!(!weak.needs_rehash(&hash));

        let stronger = weak.clone().with_argon2_params(Argon2Params {
            memory_kib: 2048,
            iterations: 2,
            parallelism: 1,
        });
        assert!(stronger.needs_rehash(&hash));
        assert!(stronger.needs_rehash("$2b$12$abcdefghijklmnopqrstuv"));
    }

    #[test]
    #[cfg(feature = "bcrypt")]
    fn test_needs_rehash_bcrypt() {
        let bcrypt_hasher = fast_hasher()
            .with_algorithm(Algorithm::Bcrypt)
            .with_bcrypt_cost(12);

        // 低 cost 的 bcrypt 哈希需要 rehash
        let low_cost_hasher = fast_hasher()
            .with_algorithm(Algorithm::Bcrypt)
            .with_bcrypt_cost(4);
        let low_cost_hash = low_cost_hasher.hash("longenoughpassword").unwrap();
        assert!(bcrypt_hasher.needs_rehash(&low_cost_hash));
    }

    #[test]
    #[should_panic(expected = "bcrypt cost must be between 4 and 31")]
    #[cfg(feature = "bcrypt")]
    fn test_invalid_bcrypt_cost_low() {
        let _ = fast_hasher().with_bcrypt_cost(3);
    }
}
