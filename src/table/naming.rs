//! Default file names for `encode` calls without an explicit path.
use rand::Rng;
use std::path::PathBuf;

/// Upper bound (exclusive) of the random file stem.
const MAX_STEM: u64 = 9_999_999_999;

/// Produces the path `encode` writes to when none is given.
pub trait NameGenerator {
    fn generate(&self) -> PathBuf;
}

/// A random integer stem with the legacy extension, relative to the current directory.
#[derive(Copy, Clone, Debug, Default)]
pub struct RandomNames;

impl NameGenerator for RandomNames {
    fn generate(&self) -> PathBuf {
        let stem = rand::thread_rng().gen_range(0..MAX_STEM);
        PathBuf::from(format!("{stem}.xls"))
    }
}

impl<F> NameGenerator for F
where
    F: Fn() -> PathBuf,
{
    fn generate(&self) -> PathBuf {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_names_are_numeric_xls_files() {
        for _ in 0..100 {
            let path = RandomNames.generate();
            assert_eq!(path.extension().and_then(|it| it.to_str()), Some("xls"));
            let stem: u64 = path.file_stem().and_then(|it| it.to_str()).unwrap().parse().unwrap();
            assert!(stem < MAX_STEM);
            assert_eq!(path.parent(), Some(std::path::Path::new("")));
        }
    }

    #[test]
    fn closures_generate_names() {
        let generator = || PathBuf::from("fixed.xlsx");
        assert_eq!(generator.generate(), PathBuf::from("fixed.xlsx"));
    }
}
