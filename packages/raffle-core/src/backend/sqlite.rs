//! [`AuthProvider`] and [`DocumentStore`] over the SQLite [`Database`].

use async_trait::async_trait;

use super::credentials::{
    invalid_credentials, normalize_email, validate_email, validate_password, HashedPassword,
};
use super::{AuthProvider, Document, DocumentStore, Snapshot};
use crate::error::{AuthErrorKind, Error, Result};
use crate::person::AccountId;
use crate::storage::Database;

#[async_trait]
impl AuthProvider for Database {
    async fn create_credential(&self, email: &str, password: &str) -> Result<AccountId> {
        validate_email(email)?;
        validate_password(password)?;

        let account = AccountId::generate();
        self.insert_credential(&account, &normalize_email(email), &HashedPassword::new(password))?;
        self.signed_in.lock().insert(account.clone());

        tracing::debug!(account = %account, "Credential created");
        Ok(account)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AccountId> {
        let record = self
            .get_credential_by_email(&normalize_email(email))?
            .filter(|r| r.password.verify(password))
            .ok_or_else(invalid_credentials)?;

        self.signed_in.lock().insert(record.account_id.clone());
        Ok(record.account_id)
    }

    async fn sign_out(&self, account: &AccountId) -> Result<()> {
        self.signed_in.lock().remove(account);
        Ok(())
    }

    async fn send_reset(&self, email: &str) -> Result<()> {
        let email = normalize_email(email);
        if self.get_credential_by_email(&email)?.is_none() {
            return Err(Error::auth(
                AuthErrorKind::UnknownAccount,
                "There is no user record corresponding to this identifier.",
            ));
        }

        self.record_password_reset(&email)?;
        tracing::info!(email = %email, "Password reset requested");
        Ok(())
    }

    async fn delete_credential(&self, account: &AccountId) -> Result<()> {
        if !self.delete_credential_row(account)? {
            return Err(Error::auth(
                AuthErrorKind::UnknownAccount,
                format!("No credential for account {}", account),
            ));
        }

        self.signed_in.lock().remove(account);
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for Database {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>> {
        self.get_document(collection, key)
    }

    async fn set(&self, collection: &str, key: &str, doc: Document) -> Result<()> {
        self.put_document(collection, key, &doc)
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<()> {
        self.delete_document(collection, key).map(|_| ())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Snapshot>> {
        self.list_documents(collection)
    }

    async fn query_eq(&self, collection: &str, field: &str, value: &str) -> Result<Vec<Snapshot>> {
        self.find_documents_eq(collection, field, value)
    }

    async fn query_contains(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Snapshot>> {
        self.find_documents_containing(collection, field, value)
    }

    async fn array_union(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<()> {
        self.union_into_array(collection, key, field, value)
    }
}
