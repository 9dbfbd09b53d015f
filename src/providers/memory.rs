//! In-Memory Store
//!
//! DashMap-backed implementation of `Store` with the same semantics as the
//! PostgreSQL store, including trigram search. Used when no DATABASE_URL is
//! configured and by the test suite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use std::cmp::Ordering;
use std::collections::HashSet;
use uuid::Uuid;

use super::store::Store;
use crate::core::trigram::score_listing;
use crate::models::{
    AppError, AppResult, ChatMessage, ChatRoom, Listing, ListingQuery, ListingSort,
    RefreshTokenRecord, SearchHits, User, WishlistEntry,
};

#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<Uuid, User>,
    /// lowercased email -> user id
    emails: DashMap<String, Uuid>,
    /// lowercased username -> user id
    usernames: DashMap<String, Uuid>,
    refresh_tokens: DashMap<String, RefreshTokenRecord>,
    listings: DashMap<Uuid, Listing>,
    wishlist: DashMap<(Uuid, Uuid), WishlistEntry>,
    chatrooms: DashMap<Uuid, ChatRoom>,
    /// (listing id, buyer id) -> chatroom id
    room_pairs: DashMap<(Uuid, Uuid), Uuid>,
    /// chatroom id -> messages in send order
    messages: DashMap<Uuid, Vec<ChatMessage>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn remove_chatrooms_where(&self, predicate: impl Fn(&ChatRoom) -> bool) {
        let doomed: Vec<Uuid> = self
            .chatrooms
            .iter()
            .filter(|r| predicate(r.value()))
            .map(|r| *r.key())
            .collect();

        for id in doomed {
            if let Some((_, room)) = self.chatrooms.remove(&id) {
                self.room_pairs.remove(&(room.listing_id, room.buyer_id));
            }
            self.messages.remove(&id);
        }
    }
}

fn newest_first(a: &Listing, b: &Listing) -> Ordering {
    b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id))
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    // ============================================
    // Users
    // ============================================

    async fn create_user(&self, user: User) -> AppResult<User> {
        let email_key = user.email.to_lowercase();
        let username_key = user.username.to_lowercase();

        match self.emails.entry(email_key.clone()) {
            Entry::Occupied(_) => return Err(AppError::conflict("Email is already registered")),
            Entry::Vacant(slot) => {
                slot.insert(user.id);
            }
        }

        match self.usernames.entry(username_key) {
            Entry::Occupied(_) => {
                self.emails.remove(&email_key);
                return Err(AppError::conflict("Username is already taken"));
            }
            Entry::Vacant(slot) => {
                slot.insert(user.id);
            }
        }

        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let id = self.emails.get(&email.to_lowercase()).map(|id| *id);
        Ok(id.and_then(|id| self.users.get(&id).map(|u| u.clone())))
    }

    async fn find_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let id = self.usernames.get(&username.to_lowercase()).map(|id| *id);
        Ok(id.and_then(|id| self.users.get(&id).map(|u| u.clone())))
    }

    async fn update_user(&self, user: &User) -> AppResult<()> {
        match self.users.get_mut(&user.id) {
            Some(mut existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(AppError::not_found("User")),
        }
    }

    async fn delete_user(&self, id: Uuid) -> AppResult<bool> {
        let Some((_, user)) = self.users.remove(&id) else {
            return Ok(false);
        };

        self.emails.remove(&user.email.to_lowercase());
        self.usernames.remove(&user.username.to_lowercase());
        self.refresh_tokens.retain(|_, t| t.user_id != id);

        let owned: HashSet<Uuid> = self
            .listings
            .iter()
            .filter(|l| l.seller_id == id)
            .map(|l| l.id)
            .collect();
        self.listings.retain(|_, l| l.seller_id != id);
        self.wishlist
            .retain(|(user_id, listing_id), _| *user_id != id && !owned.contains(listing_id));
        self.remove_chatrooms_where(|r| r.is_participant(id) || owned.contains(&r.listing_id));

        Ok(true)
    }

    // ============================================
    // Refresh tokens
    // ============================================

    async fn insert_refresh_token(&self, record: RefreshTokenRecord) -> AppResult<()> {
        self.refresh_tokens.insert(record.token_hash.clone(), record);
        Ok(())
    }

    async fn find_refresh_token(&self, token_hash: &str) -> AppResult<Option<RefreshTokenRecord>> {
        Ok(self.refresh_tokens.get(token_hash).map(|t| t.clone()))
    }

    async fn revoke_refresh_token(&self, token_hash: &str, at: DateTime<Utc>) -> AppResult<bool> {
        match self.refresh_tokens.get_mut(token_hash) {
            Some(mut record) if record.revoked_at.is_none() => {
                record.revoked_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_user_refresh_tokens(&self, user_id: Uuid, at: DateTime<Utc>) -> AppResult<u64> {
        let mut revoked = 0;
        for mut record in self.refresh_tokens.iter_mut() {
            if record.user_id == user_id && record.revoked_at.is_none() {
                record.revoked_at = Some(at);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    // ============================================
    // Listings
    // ============================================

    async fn insert_listing(&self, listing: Listing) -> AppResult<Listing> {
        if !self.users.contains_key(&listing.seller_id) {
            return Err(AppError::not_found("Seller"));
        }
        self.listings.insert(listing.id, listing.clone());
        Ok(listing)
    }

    async fn find_listing(&self, id: Uuid) -> AppResult<Option<Listing>> {
        Ok(self.listings.get(&id).map(|l| l.clone()))
    }

    async fn find_listings(&self, ids: &[Uuid]) -> AppResult<Vec<Listing>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.listings.get(id).map(|l| l.clone()))
            .collect())
    }

    async fn update_listing(&self, listing: &Listing) -> AppResult<()> {
        match self.listings.get_mut(&listing.id) {
            Some(mut existing) => {
                *existing = listing.clone();
                Ok(())
            }
            None => Err(AppError::not_found("Listing")),
        }
    }

    async fn delete_listing(&self, id: Uuid) -> AppResult<bool> {
        if self.listings.remove(&id).is_none() {
            return Ok(false);
        }
        self.wishlist.retain(|(_, listing_id), _| *listing_id != id);
        self.remove_chatrooms_where(|r| r.listing_id == id);
        Ok(true)
    }

    async fn listings_by_seller(&self, seller_id: Uuid) -> AppResult<Vec<Listing>> {
        let mut listings: Vec<Listing> = self
            .listings
            .iter()
            .filter(|l| l.seller_id == seller_id)
            .map(|l| l.clone())
            .collect();
        listings.sort_by(newest_first);
        Ok(listings)
    }

    async fn search_listings(&self, query: &ListingQuery) -> AppResult<SearchHits> {
        let mut scored: Vec<(f64, Listing)> = self
            .listings
            .iter()
            .filter(|l| query.matches_filters(l.value()))
            .filter_map(|l| match &query.text {
                Some(text) => score_listing(l.value(), text).map(|s| (s, l.clone())),
                None => Some((0.0, l.clone())),
            })
            .collect();

        scored.sort_by(|(sa, a), (sb, b)| match query.sort {
            ListingSort::Relevance => sb
                .partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| newest_first(a, b)),
            ListingSort::Newest => newest_first(a, b),
            ListingSort::PriceAsc => a.price_cents.cmp(&b.price_cents).then_with(|| newest_first(a, b)),
            ListingSort::PriceDesc => b.price_cents.cmp(&a.price_cents).then_with(|| newest_first(a, b)),
        });

        let total = scored.len() as u64;
        let ids = scored
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .map(|(_, l)| l.id)
            .collect();

        Ok(SearchHits { ids, total })
    }

    async fn referenced_object_keys(&self) -> AppResult<HashSet<String>> {
        let mut keys: HashSet<String> = self
            .listings
            .iter()
            .flat_map(|l| l.image_keys.clone())
            .collect();
        keys.extend(self.users.iter().filter_map(|u| u.avatar_key.clone()));
        Ok(keys)
    }

    // ============================================
    // Wishlist
    // ============================================

    async fn add_wishlist(&self, entry: WishlistEntry) -> AppResult<bool> {
        if !self.listings.contains_key(&entry.listing_id) {
            return Err(AppError::not_found("Listing"));
        }
        match self.wishlist.entry((entry.user_id, entry.listing_id)) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(entry);
                Ok(true)
            }
        }
    }

    async fn remove_wishlist(&self, user_id: Uuid, listing_id: Uuid) -> AppResult<bool> {
        Ok(self.wishlist.remove(&(user_id, listing_id)).is_some())
    }

    async fn wishlist(&self, user_id: Uuid) -> AppResult<Vec<WishlistEntry>> {
        let mut entries: Vec<WishlistEntry> = self
            .wishlist
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.clone())
            .collect();
        entries.sort_by(|a, b| b.added_at.cmp(&a.added_at));
        Ok(entries)
    }

    // ============================================
    // Chat
    // ============================================

    async fn find_chatroom_for(&self, listing_id: Uuid, buyer_id: Uuid) -> AppResult<Option<ChatRoom>> {
        let id = self.room_pairs.get(&(listing_id, buyer_id)).map(|id| *id);
        Ok(id.and_then(|id| self.chatrooms.get(&id).map(|r| r.clone())))
    }

    async fn insert_chatroom(&self, room: ChatRoom) -> AppResult<ChatRoom> {
        match self.room_pairs.entry((room.listing_id, room.buyer_id)) {
            Entry::Occupied(_) => return Err(AppError::conflict("Chat room already exists")),
            Entry::Vacant(slot) => {
                slot.insert(room.id);
            }
        }
        self.chatrooms.insert(room.id, room.clone());
        self.messages.entry(room.id).or_default();
        Ok(room)
    }

    async fn find_chatroom(&self, id: Uuid) -> AppResult<Option<ChatRoom>> {
        Ok(self.chatrooms.get(&id).map(|r| r.clone()))
    }

    async fn chatrooms_for_user(&self, user_id: Uuid) -> AppResult<Vec<ChatRoom>> {
        let mut rooms: Vec<ChatRoom> = self
            .chatrooms
            .iter()
            .filter(|r| r.is_participant(user_id))
            .map(|r| r.clone())
            .collect();
        rooms.sort_by(|a, b| b.last_activity().cmp(&a.last_activity()));
        Ok(rooms)
    }

    async fn insert_message(&self, message: ChatMessage) -> AppResult<ChatMessage> {
        match self.chatrooms.get_mut(&message.chatroom_id) {
            Some(mut room) => room.last_message_at = Some(message.sent_at),
            None => return Err(AppError::not_found("Chat room")),
        }
        self.messages
            .entry(message.chatroom_id)
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn messages(
        &self,
        chatroom_id: Uuid,
        before: Option<DateTime<Utc>>,
        limit: u32,
    ) -> AppResult<Vec<ChatMessage>> {
        let Some(all) = self.messages.get(&chatroom_id) else {
            return Ok(Vec::new());
        };

        let eligible: Vec<&ChatMessage> = all
            .iter()
            .filter(|m| before.map_or(true, |b| m.sent_at < b))
            .collect();
        let start = eligible.len().saturating_sub(limit as usize);

        Ok(eligible[start..].iter().map(|m| (*m).clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Condition, ErrorCode, ListingStatus, NewUser};
    use chrono::Duration;
    use std::sync::Arc;

    fn user(name: &str) -> User {
        User::new(
            NewUser {
                email: format!("{}@example.com", name),
                username: name.to_string(),
                password_hash: "hash".to_string(),
                display_name: None,
            },
            Utc::now(),
        )
    }

    fn listing(seller: Uuid, title: &str, price: i64, age_secs: i64) -> Listing {
        let at = Utc::now() - Duration::seconds(age_secs);
        Listing {
            id: Uuid::new_v4(),
            seller_id: seller,
            title: title.to_string(),
            description: String::new(),
            price_cents: price,
            category: "tops".to_string(),
            size: "M".to_string(),
            condition: Condition::Good,
            brand: None,
            image_keys: vec![format!("uploads/{}/{}.jpg", seller, Uuid::new_v4())],
            status: ListingStatus::Available,
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn test_unique_email_and_username() {
        let store = MemoryStore::new();
        store.create_user(user("ada")).await.unwrap();

        let mut dup_email = user("grace");
        dup_email.email = "ADA@example.com".to_lowercase();
        assert_eq!(store.create_user(dup_email).await.unwrap_err().code, ErrorCode::ApiConflict);

        let mut dup_name = user("other");
        dup_name.username = "ADA".to_string();
        assert_eq!(store.create_user(dup_name).await.unwrap_err().code, ErrorCode::ApiConflict);

        // failed username reservation must release the email
        let mut retry = user("other");
        retry.username = "other".to_string();
        assert!(store.create_user(retry).await.is_ok());
        assert!(store.find_user_by_username("Ada").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_search_sorts_and_pages() {
        let store = MemoryStore::new();
        let seller = store.create_user(user("seller")).await.unwrap();
        store.insert_listing(listing(seller.id, "Red wool sweater", 3000, 30)).await.unwrap();
        store.insert_listing(listing(seller.id, "Blue denim jacket", 5000, 20)).await.unwrap();
        let newest = store.insert_listing(listing(seller.id, "Black denim jeans", 1000, 10)).await.unwrap();

        let by_price = store
            .search_listings(&ListingQuery { sort: ListingSort::PriceAsc, ..ListingQuery::default() })
            .await
            .unwrap();
        assert_eq!(by_price.total, 3);
        assert_eq!(by_price.ids[0], newest.id);

        let denim = store
            .search_listings(&ListingQuery {
                text: Some("denim".to_string()),
                sort: ListingSort::Relevance,
                ..ListingQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(denim.total, 2);

        let page = store
            .search_listings(&ListingQuery { offset: 2, limit: 2, ..ListingQuery::default() })
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.ids.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_listing_cascades() {
        let store = MemoryStore::new();
        let seller = store.create_user(user("seller")).await.unwrap();
        let buyer = store.create_user(user("buyer")).await.unwrap();
        let item = store.insert_listing(listing(seller.id, "Boots", 100, 0)).await.unwrap();

        store
            .add_wishlist(WishlistEntry { user_id: buyer.id, listing_id: item.id, added_at: Utc::now() })
            .await
            .unwrap();
        let room = store
            .insert_chatroom(ChatRoom {
                id: Uuid::new_v4(),
                listing_id: item.id,
                buyer_id: buyer.id,
                seller_id: seller.id,
                created_at: Utc::now(),
                last_message_at: None,
            })
            .await
            .unwrap();

        assert!(store.delete_listing(item.id).await.unwrap());
        assert!(store.wishlist(buyer.id).await.unwrap().is_empty());
        assert!(store.find_chatroom(room.id).await.unwrap().is_none());
        assert!(!store.delete_listing(item.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_messages_page_before_cursor() {
        let store = MemoryStore::new();
        let seller = store.create_user(user("seller")).await.unwrap();
        let buyer = store.create_user(user("buyer")).await.unwrap();
        let item = store.insert_listing(listing(seller.id, "Scarf", 100, 0)).await.unwrap();
        let room = store
            .insert_chatroom(ChatRoom {
                id: Uuid::new_v4(),
                listing_id: item.id,
                buyer_id: buyer.id,
                seller_id: seller.id,
                created_at: Utc::now(),
                last_message_at: None,
            })
            .await
            .unwrap();

        let base = Utc::now();
        for i in 0..5 {
            store
                .insert_message(ChatMessage {
                    id: Uuid::new_v4(),
                    chatroom_id: room.id,
                    sender_id: buyer.id,
                    content: format!("msg {}", i),
                    sent_at: base + Duration::seconds(i),
                })
                .await
                .unwrap();
        }

        let latest = store.messages(room.id, None, 2).await.unwrap();
        let contents: Vec<_> = latest.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["msg 3", "msg 4"]);

        let older = store.messages(room.id, Some(latest[0].sent_at), 10).await.unwrap();
        assert_eq!(older.len(), 3);
        assert_eq!(older[0].content, "msg 0");

        let room = store.find_chatroom(room.id).await.unwrap().unwrap();
        assert_eq!(room.last_message_at, Some(base + Duration::seconds(4)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_room_creation_keeps_one_room() {
        let store = Arc::new(MemoryStore::new());
        let seller = store.create_user(user("seller")).await.unwrap();
        let buyer = store.create_user(user("buyer")).await.unwrap();
        let item = store.insert_listing(listing(seller.id, "Beanie", 900, 0)).await.unwrap();

        let attempts: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .insert_chatroom(ChatRoom {
                            id: Uuid::new_v4(),
                            listing_id: item.id,
                            buyer_id: buyer.id,
                            seller_id: seller.id,
                            created_at: Utc::now(),
                            last_message_at: None,
                        })
                        .await
                })
            })
            .collect();

        let mut created = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => created += 1,
                Err(e) => assert_eq!(e.code, ErrorCode::ApiConflict),
            }
        }

        assert_eq!(created, 1);
        assert_eq!(store.chatrooms_for_user(buyer.id).await.unwrap().len(), 1);
        assert!(store.find_chatroom_for(item.id, buyer.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_refresh_token_revocation() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        for hash in ["a", "b"] {
            store
                .insert_refresh_token(RefreshTokenRecord {
                    token_hash: hash.to_string(),
                    user_id: owner,
                    expires_at: Utc::now() + Duration::hours(1),
                    revoked_at: None,
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        assert!(store.revoke_refresh_token("a", Utc::now()).await.unwrap());
        assert!(!store.revoke_refresh_token("a", Utc::now()).await.unwrap());
        assert_eq!(store.revoke_user_refresh_tokens(owner, Utc::now()).await.unwrap(), 1);
    }
}
