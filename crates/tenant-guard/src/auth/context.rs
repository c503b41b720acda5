//! Resolved identity in request extensions

use std::sync::Arc;

use http::Extensions;

use super::user::User;

#[derive(Debug, Clone)]
struct ResolvedUser(Arc<User>);

/// Store `user` as the identity of the request owning `extensions`.
pub fn put_user_in_context(extensions: &mut Extensions, user: Arc<User>) {
    extensions.insert(ResolvedUser(user));
}

/// The identity stored by [`put_user_in_context`], or the guest.
pub fn get_user_from_context(extensions: &Extensions) -> Arc<User> {
    extensions
        .get::<ResolvedUser>()
        .map_or_else(User::guest, |u| Arc::clone(&u.0))
}

/// Identity of `request`, see [`get_user_from_context`].
pub fn get_user<B>(request: &http::Request<B>) -> Arc<User> {
    get_user_from_context(request.extensions())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_user_is_guest() {
        let extensions = Extensions::new();
        assert!(get_user_from_context(&extensions).is_guest());
    }

    #[test]
    fn test_put_and_get() {
        let mut request = http::Request::new(());
        let user = Arc::new(User {
            name: "achim".into(),
            tenant: "tnnt".into(),
            ..User::default()
        });
        put_user_in_context(request.extensions_mut(), Arc::clone(&user));

        let stored = get_user(&request);
        assert!(Arc::ptr_eq(&stored, &user));
        assert_eq!(stored.tenant, "tnnt");
    }

    #[test]
    fn test_put_replaces_previous_user() {
        let mut extensions = Extensions::new();
        put_user_in_context(&mut extensions, User::guest());
        put_user_in_context(
            &mut extensions,
            Arc::new(User {
                name: "second".into(),
                ..User::default()
            }),
        );
        assert_eq!(get_user_from_context(&extensions).name, "second");
    }
}
