//! Random resource names and admin credentials for the demo plan.

use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;

const STORAGE_NAME_MAX: usize = 24;
const DNS_LABEL_MAX: usize = 63;
const SUFFIX_DIGITS: usize = 5;

/// Generates unique names with a common prefix.
#[derive(Debug, Clone, Default)]
pub struct Namer {
    prefix: String,
}

impl Namer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// `{prefix}{base}{digits}`
    pub fn name(&self, base: &str) -> String {
        format!("{}{}{}", self.prefix, base, suffix())
    }

    /// Lowercase letters, digits and hyphens, starting with a letter.
    pub fn dns_label(&self, base: &str) -> String {
        let mut label: String = format!("{}{}", self.prefix, base)
            .chars()
            .map(|c| c.to_ascii_lowercase())
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .skip_while(|c| !c.is_ascii_lowercase())
            .collect();
        if label.is_empty() {
            label.push('x');
        }
        label.truncate(DNS_LABEL_MAX - SUFFIX_DIGITS);
        label.push_str(&suffix());
        label
    }

    /// Storage account names: 3-24 lowercase letters and digits.
    pub fn storage_account(&self, base: &str) -> String {
        let mut name: String = format!("{}{}", self.prefix, base)
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        name.truncate(STORAGE_NAME_MAX - SUFFIX_DIGITS);
        name.push_str(&suffix());
        name
    }
}

fn suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_DIGITS)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Password with upper and lower case letters, digits and a symbol.
pub fn password(len: usize) -> String {
    const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
    const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
    const DIGITS: &[u8] = b"23456789";
    const SYMBOLS: &[u8] = b"!#%+-=?@";

    let mut rng = rand::thread_rng();
    let mut chars: Vec<char> = [UPPER, LOWER, DIGITS, SYMBOLS]
        .iter()
        .filter_map(|class| class.choose(&mut rng))
        .map(|&b| char::from(b))
        .collect();
    let rest = len.saturating_sub(chars.len());
    chars.extend((&mut rng).sample_iter(Alphanumeric).take(rest).map(char::from));
    chars.shuffle(&mut rng);
    chars.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_has_prefix_and_suffix() {
        let namer = Namer::new("demo-");
        let name = namer.name("vnet");
        assert!(name.starts_with("demo-vnet"));
        assert_eq!(name.len(), "demo-vnet".len() + SUFFIX_DIGITS);
        assert!(name[9..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_names_differ() {
        let namer = Namer::default();
        let names: std::collections::HashSet<_> = (0..20).map(|_| namer.name("rg")).collect();
        assert!(names.len() > 1);
    }

    #[test]
    fn test_storage_account_name_rules() {
        let namer = Namer::new("My_Very-Long.Project-Prefix");
        let name = namer.storage_account("saname");
        assert!((3..=STORAGE_NAME_MAX).contains(&name.len()));
        assert!(
            name.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        );
        assert!(name.starts_with("myverylongproject"));
    }

    #[test]
    fn test_dns_label_rules() {
        let namer = Namer::new("9_Demo.");
        let label = namer.dns_label("pip");
        assert!(label.starts_with("demopip"));
        assert!(
            label
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        );
    }

    #[test]
    fn test_password_complexity() {
        for _ in 0..20 {
            let pw = password(16);
            assert_eq!(pw.len(), 16);
            assert!(pw.chars().any(|c| c.is_ascii_uppercase()));
            assert!(pw.chars().any(|c| c.is_ascii_lowercase()));
            assert!(pw.chars().any(|c| c.is_ascii_digit()));
            assert!(pw.chars().any(|c| !c.is_ascii_alphanumeric()));
        }
    }
}
