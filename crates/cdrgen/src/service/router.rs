use crate::common::{Error, ErrorTag, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use udr::{Generate, UdrKind, generator_for};

/// A request's variant together with the generator bound to it.
#[derive(Clone)]
pub struct Route {
    pub kind: UdrKind,
    pub generator: Arc<dyn Generate>,
}

/// Maps error tags to generators.
///
/// A router always has a generator for every [`UdrKind`]: the standard
/// router is total by construction and [`RouterBuilder::build`] refuses to
/// produce one with gaps.
pub struct Router {
    generators: BTreeMap<UdrKind, Arc<dyn Generate>>,
}

impl Router {
    /// The built-in generator for every variant.
    pub fn standard() -> Self {
        Self {
            generators: UdrKind::ALL
                .into_iter()
                .map(|kind| (kind, generator_for(kind)))
                .collect(),
        }
    }

    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    /// Resolves `tag` and returns the generator bound to it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownVariant`] if `tag` names no variant.
    pub fn route(&self, tag: &ErrorTag) -> Result<Route> {
        let kind = tag.resolve()?;
        let generator = self
            .generators
            .get(&kind)
            .cloned()
            .ok_or_else(|| Error::UnknownVariant {
                tag: tag.to_string(),
            })?;
        Ok(Route { kind, generator })
    }
}

/// Binds generators one by one, keyed by the kind each reports.
#[derive(Default)]
pub struct RouterBuilder {
    generators: BTreeMap<UdrKind, Arc<dyn Generate>>,
}

impl RouterBuilder {
    /// Binds `generator` to the kind it produces, replacing any earlier
    /// binding for that kind.
    #[must_use]
    pub fn bind(mut self, generator: Arc<dyn Generate>) -> Self {
        self.generators.insert(generator.kind(), generator);
        self
    }

    /// # Errors
    ///
    /// Returns [`Error::IncompleteRouting`] listing every kind left unbound.
    pub fn build(self) -> Result<Router> {
        let missing: Vec<UdrKind> = UdrKind::ALL
            .into_iter()
            .filter(|kind| !self.generators.contains_key(kind))
            .collect();

        if !missing.is_empty() {
            return Err(Error::IncompleteRouting { missing });
        }

        Ok(Router {
            generators: self.generators,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use udr::{EuiErrorUdr, FormatErrorUdr, NormalUdr, TimeErrorUdr};

    #[test]
    fn standard_router_covers_every_code_and_name() {
        let router = Router::standard();
        for kind in UdrKind::ALL {
            let by_code = router.route(&ErrorTag::Code(kind.code())).unwrap();
            assert_eq!(by_code.kind, kind);
            assert_eq!(by_code.generator.kind(), kind);

            let by_name = router
                .route(&ErrorTag::Name(kind.as_str().to_uppercase()))
                .unwrap();
            assert_eq!(by_name.kind, kind);
        }
    }

    #[test]
    fn unknown_tags_fail_explicitly() {
        let router = Router::standard();
        for tag in [
            ErrorTag::Code(-1),
            ErrorTag::Code(4),
            ErrorTag::Name("timeerror".into()),
            ErrorTag::Name(String::new()),
        ] {
            assert!(matches!(
                router.route(&tag),
                Err(Error::UnknownVariant { .. })
            ));
        }
    }

    #[test]
    fn builder_reports_every_missing_kind() {
        let err = Router::builder()
            .bind(Arc::new(NormalUdr))
            .bind(Arc::new(EuiErrorUdr))
            .build()
            .err()
            .unwrap();

        assert!(matches!(
            err,
            Error::IncompleteRouting { ref missing }
                if missing == &[UdrKind::TimeError, UdrKind::FormatError]
        ));
    }

    #[test]
    fn builder_accepts_full_coverage() {
        let router = Router::builder()
            .bind(Arc::new(FormatErrorUdr))
            .bind(Arc::new(TimeErrorUdr))
            .bind(Arc::new(EuiErrorUdr))
            .bind(Arc::new(NormalUdr))
            .build()
            .unwrap();

        let route = router.route(&ErrorTag::Name("fmt_err".into())).unwrap();
        assert_eq!(route.kind, UdrKind::FormatError);
    }
}
