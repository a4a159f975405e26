use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::{
    api::realtime::{ChangeEvent, ChangeOp, RealtimeHub, Table},
    error::{AppError, AppResult},
    models::{NowPlaying, SpotifyTokens},
    spotify::{CurrentlyPlaying, Playback, SpotifyApi},
    storage::Store,
};

const UNKNOWN: &str = "Unknown";

/// Per-user single-flight guard. Now-playing fetches (with their token
/// refresh) and disconnects for one user run one at a time.
#[derive(Default)]
pub struct RefreshLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl RefreshLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the user's lock. It is held until the returned guard drops.
    pub async fn scoped(&self, user_id: Uuid) -> UserScope<'_> {
        let lock = self.locks.entry(user_id).or_default().clone();
        let guard = lock.lock_owned().await;
        UserScope {
            locks: self,
            user_id,
            guard: Some(guard),
        }
    }

    /// Drops the entry once no caller holds or waits on it.
    fn release(&self, user_id: Uuid) {
        self.locks
            .remove_if(&user_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locks.len()
    }
}

pub struct UserScope<'a> {
    locks: &'a RefreshLocks,
    user_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserScope<'_> {
    fn drop(&mut self) {
        // Unlock first so the map entry is the last reference.
        self.guard.take();
        self.locks.release(self.user_id);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NowPlayingOutcome {
    Playing(NowPlaying),
    NotPlaying,
}

pub struct NowPlayingService {
    store: Arc<dyn Store>,
    spotify: Arc<dyn SpotifyApi>,
    locks: Arc<RefreshLocks>,
    realtime: Arc<RealtimeHub>,
}

impl NowPlayingService {
    pub fn new(
        store: Arc<dyn Store>,
        spotify: Arc<dyn SpotifyApi>,
        locks: Arc<RefreshLocks>,
        realtime: Arc<RealtimeHub>,
    ) -> Self {
        Self {
            store,
            spotify,
            locks,
            realtime,
        }
    }

    /// Current playback for `user_id`, refreshing the access token at most
    /// once on a 401.
    pub async fn fetch(&self, user_id: Uuid) -> AppResult<NowPlayingOutcome> {
        let _scope = self.locks.scoped(user_id).await;
        self.fetch_locked(user_id).await
    }

    async fn fetch_locked(&self, user_id: Uuid) -> AppResult<NowPlayingOutcome> {
        // Read under the lock so a waiter sees a token refreshed by the holder.
        let tokens = self
            .store
            .spotify_tokens(user_id)
            .await?
            .ok_or(AppError::NotConnected)?;

        let playback = match self.spotify.currently_playing(&tokens.access_token).await? {
            Playback::Unauthorized => {
                let access_token = self.refresh(user_id, &tokens).await?;
                match self.spotify.currently_playing(&access_token).await? {
                    Playback::Unauthorized => {
                        return Err(AppError::UpstreamAuth(
                            "refreshed token was rejected".to_string(),
                        ))
                    }
                    playback => playback,
                }
            }
            playback => playback,
        };

        let current = match playback {
            Playback::Playing(current) => current,
            // Nothing playing leaves the last known track in the cache.
            Playback::Idle | Playback::Unauthorized => return Ok(NowPlayingOutcome::NotPlaying),
        };

        // A disconnect that slipped in leaves nothing to cache.
        let entry = self
            .store
            .upsert_now_playing(&project(user_id, &current))
            .await?
            .ok_or(AppError::NotConnected)?;

        self.realtime
            .publish(
                user_id,
                ChangeEvent::new(Table::NowPlaying, ChangeOp::Update, &entry),
            )
            .await;

        Ok(NowPlayingOutcome::Playing(entry))
    }

    async fn refresh(&self, user_id: Uuid, tokens: &SpotifyTokens) -> AppResult<String> {
        tracing::debug!("Spotify access token expired for {}", user_id);

        let grant = self
            .spotify
            .refresh_access_token(&tokens.refresh_token)
            .await?;

        self.store
            .update_spotify_tokens(
                user_id,
                &grant.access_token,
                grant.refresh_token.as_deref(),
            )
            .await?;

        tracing::info!(
            "Refreshed Spotify access token for {} (expires in {}s)",
            user_id,
            grant.expires_in
        );
        Ok(grant.access_token)
    }
}

fn project(user_id: Uuid, current: &CurrentlyPlaying) -> NowPlaying {
    let item = current.item.as_ref();
    let named = |name: Option<&String>| name.cloned().unwrap_or_else(|| UNKNOWN.to_string());

    NowPlaying {
        user_id,
        track_name: named(item.and_then(|t| t.name.as_ref())),
        artist_name: named(
            item.and_then(|t| t.artists.first())
                .and_then(|a| a.name.as_ref()),
        ),
        album_name: named(
            item.and_then(|t| t.album.as_ref())
                .and_then(|a| a.name.as_ref()),
        ),
        is_playing: current.is_playing,
        updated_at: Utc::now(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex as StdMutex,
        },
        time::Duration,
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{
        spotify::{Album, Artist, SpotifyUser, TokenGrant, Track},
        storage::memory::MemoryStore,
    };

    /// Scripted Spotify: answers currently-playing by access token and
    /// counts every upstream call.
    #[derive(Default)]
    pub struct FakeSpotify {
        pub valid_tokens: StdMutex<Vec<String>>,
        pub playback: StdMutex<Option<CurrentlyPlaying>>,
        pub refresh_results: StdMutex<VecDeque<AppResult<TokenGrant>>>,
        pub playing_calls: AtomicUsize,
        pub refresh_calls: AtomicUsize,
        pub refresh_delay: Option<Duration>,
    }

    impl FakeSpotify {
        pub fn accepting(tokens: &[&str]) -> Self {
            Self {
                valid_tokens: StdMutex::new(tokens.iter().map(|t| t.to_string()).collect()),
                ..Default::default()
            }
        }

        pub fn playing(self, track: &str, artist: &str, album: &str) -> Self {
            *self.playback.lock().unwrap() = Some(CurrentlyPlaying {
                is_playing: true,
                item: Some(Track {
                    name: Some(track.to_string()),
                    artists: vec![Artist {
                        name: Some(artist.to_string()),
                    }],
                    album: Some(Album {
                        name: Some(album.to_string()),
                    }),
                }),
            });
            self
        }

        pub fn refreshes_to(self, access_token: &str) -> Self {
            self.refresh_results.lock().unwrap().push_back(Ok(TokenGrant {
                access_token: access_token.to_string(),
                expires_in: 3600,
                refresh_token: None,
            }));
            self
        }

        pub fn calls(&self) -> (usize, usize) {
            (
                self.playing_calls.load(Ordering::SeqCst),
                self.refresh_calls.load(Ordering::SeqCst),
            )
        }
    }

    #[async_trait]
    impl SpotifyApi for FakeSpotify {
        async fn exchange_code(&self, code: &str) -> AppResult<TokenGrant> {
            if code == "good-code" {
                Ok(TokenGrant {
                    access_token: "fresh-access".to_string(),
                    expires_in: 3600,
                    refresh_token: Some("fresh-refresh".to_string()),
                })
            } else {
                Err(AppError::UpstreamAuth("invalid_grant".to_string()))
            }
        }

        async fn refresh_access_token(&self, _refresh_token: &str) -> AppResult<TokenGrant> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.refresh_delay {
                tokio::time::sleep(delay).await;
            }
            let next = self.refresh_results.lock().unwrap().pop_front();
            let grant = next.unwrap_or_else(|| {
                Err(AppError::UpstreamAuth("refresh token revoked".to_string()))
            })?;
            self.valid_tokens
                .lock()
                .unwrap()
                .push(grant.access_token.clone());
            Ok(grant)
        }

        async fn current_user(&self, access_token: &str) -> AppResult<SpotifyUser> {
            if access_token == "fresh-access" {
                Ok(SpotifyUser {
                    id: "spotify-user-1".to_string(),
                    display_name: Some("Listener".to_string()),
                })
            } else {
                Err(AppError::UpstreamAuth("bad token".to_string()))
            }
        }

        async fn currently_playing(&self, access_token: &str) -> AppResult<Playback> {
            self.playing_calls.fetch_add(1, Ordering::SeqCst);
            if !self
                .valid_tokens
                .lock()
                .unwrap()
                .iter()
                .any(|t| t == access_token)
            {
                return Ok(Playback::Unauthorized);
            }
            Ok(match self.playback.lock().unwrap().clone() {
                Some(current) => Playback::Playing(current),
                None => Playback::Idle,
            })
        }
    }

    fn service(store: Arc<MemoryStore>, spotify: Arc<FakeSpotify>) -> NowPlayingService {
        NowPlayingService::new(
            store,
            spotify,
            Arc::new(RefreshLocks::new()),
            Arc::new(RealtimeHub::new(None)),
        )
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_retried_once() {
        let store = Arc::new(MemoryStore::new());
        let user = store.seed_user("alice");
        store.set_tokens(user, "expired", "valid");

        let spotify = Arc::new(
            FakeSpotify::accepting(&[])
                .playing("Teardrop", "Massive Attack", "Mezzanine")
                .refreshes_to("renewed"),
        );

        let outcome = service(store.clone(), spotify.clone())
            .fetch(user)
            .await
            .unwrap();

        let NowPlayingOutcome::Playing(entry) = outcome else {
            panic!("expected a track");
        };
        assert_eq!(entry.track_name, "Teardrop");
        assert_eq!(entry.artist_name, "Massive Attack");
        assert_eq!(entry.album_name, "Mezzanine");
        assert!(entry.is_playing);

        assert_eq!(spotify.calls(), (2, 1));
        let profile = store.profile(user).unwrap();
        assert_eq!(profile.spotify_access_token.as_deref(), Some("renewed"));
        assert_eq!(profile.spotify_refresh_token.as_deref(), Some("valid"));
        assert_eq!(store.cached(user).unwrap(), entry);
    }

    #[tokio::test]
    async fn second_unauthorized_is_not_retried() {
        let store = Arc::new(MemoryStore::new());
        let user = store.seed_user("alice");
        store.set_tokens(user, "expired", "valid");

        // The refreshed token is rejected as well.
        let spotify = Arc::new(FakeSpotifyRejectAll(Arc::new(
            FakeSpotify::accepting(&[]).refreshes_to("renewed"),
        )));

        let svc = NowPlayingService::new(
            store.clone(),
            spotify.clone(),
            Arc::new(RefreshLocks::new()),
            Arc::new(RealtimeHub::new(None)),
        );

        let result = svc.fetch(user).await;
        assert!(matches!(result, Err(AppError::UpstreamAuth(_))));
        assert_eq!(spotify.0.calls(), (2, 1));
        assert!(store.cached(user).is_none());
    }

    /// Wraps a fake so that currently-playing always answers 401.
    struct FakeSpotifyRejectAll(Arc<FakeSpotify>);

    #[async_trait]
    impl SpotifyApi for FakeSpotifyRejectAll {
        async fn exchange_code(&self, code: &str) -> AppResult<TokenGrant> {
            self.0.exchange_code(code).await
        }

        async fn refresh_access_token(&self, refresh_token: &str) -> AppResult<TokenGrant> {
            self.0.refresh_access_token(refresh_token).await
        }

        async fn current_user(&self, access_token: &str) -> AppResult<SpotifyUser> {
            self.0.current_user(access_token).await
        }

        async fn currently_playing(&self, _access_token: &str) -> AppResult<Playback> {
            self.0.playing_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Playback::Unauthorized)
        }
    }

    #[tokio::test]
    async fn revoked_refresh_token_surfaces_upstream_auth() {
        let store = Arc::new(MemoryStore::new());
        let user = store.seed_user("alice");
        store.set_tokens(user, "expired", "revoked");

        let spotify = Arc::new(FakeSpotify::accepting(&[]));
        let result = service(store.clone(), spotify.clone()).fetch(user).await;

        assert!(matches!(result, Err(AppError::UpstreamAuth(_))));
        assert_eq!(spotify.calls(), (1, 1));
        assert_eq!(
            store.profile(user).unwrap().spotify_access_token.as_deref(),
            Some("expired")
        );
    }

    #[tokio::test]
    async fn not_connected_makes_no_network_call() {
        let store = Arc::new(MemoryStore::new());
        let user = store.seed_user("alice");
        let spotify = Arc::new(FakeSpotify::accepting(&["anything"]));

        let result = service(store, spotify.clone()).fetch(user).await;

        assert!(matches!(result, Err(AppError::NotConnected)));
        assert_eq!(spotify.calls(), (0, 0));
    }

    #[tokio::test]
    async fn nothing_playing_leaves_cache_untouched() {
        let store = Arc::new(MemoryStore::new());
        let user = store.seed_user("alice");
        store.set_tokens(user, "live", "valid");

        let spotify = Arc::new(FakeSpotify::accepting(&["live"]).playing("Song", "Band", "LP"));
        let svc = service(store.clone(), spotify.clone());
        let NowPlayingOutcome::Playing(first) = svc.fetch(user).await.unwrap() else {
            panic!("expected a track");
        };

        *spotify.playback.lock().unwrap() = None;
        assert_eq!(svc.fetch(user).await.unwrap(), NowPlayingOutcome::NotPlaying);
        assert_eq!(store.cached(user).unwrap(), first);
    }

    #[tokio::test]
    async fn missing_track_fields_become_unknown() {
        let store = Arc::new(MemoryStore::new());
        let user = store.seed_user("alice");
        store.set_tokens(user, "live", "valid");

        let spotify = Arc::new(FakeSpotify::accepting(&["live"]));
        *spotify.playback.lock().unwrap() = Some(CurrentlyPlaying {
            is_playing: false,
            item: None,
        });

        let NowPlayingOutcome::Playing(entry) =
            service(store, spotify).fetch(user).await.unwrap()
        else {
            panic!("expected a projection");
        };
        assert_eq!(entry.track_name, "Unknown");
        assert_eq!(entry.artist_name, "Unknown");
        assert_eq!(entry.album_name, "Unknown");
        assert!(!entry.is_playing);
    }

    #[tokio::test]
    async fn concurrent_fetches_refresh_once() {
        let store = Arc::new(MemoryStore::new());
        let user = store.seed_user("alice");
        store.set_tokens(user, "expired", "valid");

        let mut fake = FakeSpotify::accepting(&[])
            .playing("Song", "Band", "LP")
            .refreshes_to("renewed");
        fake.refresh_delay = Some(Duration::from_millis(20));
        let spotify = Arc::new(fake);

        let locks = Arc::new(RefreshLocks::new());
        let svc = Arc::new(NowPlayingService::new(
            store.clone(),
            spotify.clone(),
            locks.clone(),
            Arc::new(RealtimeHub::new(None)),
        ));

        let (a, b) = tokio::join!(svc.fetch(user), svc.fetch(user));
        assert!(matches!(a, Ok(NowPlayingOutcome::Playing(_))));
        assert!(matches!(b, Ok(NowPlayingOutcome::Playing(_))));

        // First caller: 401, refresh, retry. Second caller: one call with the new token.
        assert_eq!(spotify.calls(), (3, 1));
        assert_eq!(locks.len(), 0);
    }
}
