use crate::images::ImageStore;
use crate::otp::mailer::Mailer;

/// Shared application state handed to every route.
#[derive(Clone)]
pub struct AppState<S, U> {
    pub sql_storage: S,
    pub user_storage: U,
    pub images: ImageStore,
    pub mailer: Mailer,
}

impl<S, U> AppState<S, U> {
    pub fn new(sql_storage: S, user_storage: U, images: ImageStore, mailer: Mailer) -> Self {
        Self {
            sql_storage,
            user_storage,
            images,
            mailer,
        }
    }
}
