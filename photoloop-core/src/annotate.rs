//! Lazy enrichment: face detection when the crop policy needs it, and
//! background reverse-geocoding. Both run at display time, never during sync,
//! and both persist their results as soon as they have them.

use std::{path::Path, sync::mpsc::Sender, sync::Arc};

use photoloop_state::{FaceRegion, MediaId, SmartCropMethod};

use crate::library::MediaLibrary;

impl MediaLibrary {
    /// Faces for an entry: cached ones if present, otherwise a detector run
    /// whose result is persisted immediately. Returns an empty list whenever
    /// detection is disabled, not needed by the crop policy, or unavailable.
    pub(crate) fn ensure_faces(
        &self,
        id: &MediaId,
        path: &Path,
        cached: Option<Vec<FaceRegion>>,
    ) -> Vec<FaceRegion> {
        if let Some(faces) = cached {
            return faces;
        }

        let wants_faces = {
            let config = self.config.read().unwrap();
            config.scaling.face_detection
                && config.scaling.smart_crop_method == SmartCropMethod::Face
        };
        if !wants_faces {
            return Vec::new();
        }
        let Some(detector) = self.face_detector.as_ref() else {
            return Vec::new();
        };

        match detector.detect(path) {
            Ok(faces) => {
                tracing::debug!("detected {} faces for {id}", faces.len());
                let mut state = self.lock_state();
                if let Some(entry) = state.catalog.get_mut(id) {
                    entry.cached_faces = Some(faces.clone());
                    self.save_catalog_locked(&state);
                }
                faces
            }
            Err(e) => {
                tracing::debug!("face detection failed for {id}: {e}");
                Vec::new()
            }
        }
    }

    /// Kick off a background reverse-geocode for an entry that has GPS but no
    /// location yet, if the overlay would actually display one. At most one
    /// task per entry is in flight; duplicate requests are dropped. The task
    /// persists its result itself and reports the entry over `notify` so the
    /// renderer can redraw.
    pub fn spawn_geocode_if_needed(self: &Arc<Self>, id: &MediaId, notify: Sender<MediaId>) {
        let Some(geocode) = self.geocode.clone() else {
            return;
        };
        if !self.config.read().unwrap().overlay.wants_location() {
            return;
        }

        let gps = {
            let mut state = self.lock_state();
            let Some(entry) = state.catalog.get(id) else {
                return;
            };
            if entry.exif_location.is_some() {
                return;
            }
            let Some(gps) = entry.gps else {
                return;
            };
            if !state.geocode_in_flight.insert(id.clone()) {
                return;
            }
            gps
        };

        let library = Arc::clone(self);
        let id = id.clone();
        std::thread::spawn(move || {
            let location = geocode.reverse(gps.latitude, gps.longitude);
            {
                let mut state = library.lock_state();
                state.geocode_in_flight.remove(&id);
            }
            if let Some(location) = location {
                tracing::debug!("location for {id}: {location}");
                library.set_location(&id, Some(location));
                let _ = notify.send(id);
            }
        });
    }
}
