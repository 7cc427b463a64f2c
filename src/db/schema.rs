pub const SCHEMA: &str = r#"
-- Missing person cases (registered by case workers; read-mostly here)
CREATE TABLE IF NOT EXISTS missing_persons (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    case_number TEXT NOT NULL UNIQUE,
    full_name TEXT NOT NULL,
    age INTEGER,
    gender TEXT,
    phone TEXT,
    email TEXT,
    last_seen_location TEXT,
    last_seen_date TEXT,
    photo_paths TEXT NOT NULL DEFAULT '[]',  -- JSON array of reference photo paths
    physical_description TEXT,
    status TEXT NOT NULL DEFAULT 'active',   -- 'active', 'inactive', 'resolved'
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_missing_persons_status ON missing_persons(status);

-- Cached face encodings, one per (case, reference photo) pair.
-- Absence of a row means no face was found (or the photo is new); absence
-- is never recorded, so extraction is re-attempted on the next lookup.
CREATE TABLE IF NOT EXISTS face_encodings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    case_id INTEGER NOT NULL,
    photo_path TEXT NOT NULL,
    encoding BLOB NOT NULL,  -- float32 array stored as little-endian bytes
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(case_id, photo_path),
    FOREIGN KEY (case_id) REFERENCES missing_persons(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_face_encodings_case ON face_encodings(case_id);

-- Public sighting reports (created by the upload flow)
CREATE TABLE IF NOT EXISTS public_reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    report_id TEXT NOT NULL UNIQUE,
    photo_path TEXT NOT NULL,
    reporter_name TEXT,
    phone_number TEXT,
    found_location TEXT,
    found_address TEXT,
    additional_notes TEXT,
    processed INTEGER NOT NULL DEFAULT 0,
    timestamp TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_public_reports_processed ON public_reports(processed);

-- Report-to-case matches, append-only
CREATE TABLE IF NOT EXISTS matches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    case_id INTEGER NOT NULL,
    report_id INTEGER NOT NULL,
    confidence REAL NOT NULL,
    matched_photo TEXT,
    report_photo TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (case_id) REFERENCES missing_persons(id) ON DELETE CASCADE,
    FOREIGN KEY (report_id) REFERENCES public_reports(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_matches_case ON matches(case_id);
CREATE INDEX IF NOT EXISTS idx_matches_report ON matches(report_id);

-- Uploaded surveillance/bystander videos
CREATE TABLE IF NOT EXISTS video_uploads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    video_path TEXT NOT NULL,
    uploaded_by TEXT,
    processing_status TEXT NOT NULL DEFAULT 'pending',  -- 'pending', 'processing', 'completed'
    duration REAL NOT NULL DEFAULT 0,
    total_frames INTEGER NOT NULL DEFAULT 0,
    frames_processed INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_video_uploads_status ON video_uploads(processing_status);

-- Frame-level matches from video processing, append-only
CREATE TABLE IF NOT EXISTS video_matches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    video_id INTEGER NOT NULL,
    case_id INTEGER NOT NULL,
    timestamp REAL NOT NULL,   -- seconds into the video
    frame_path TEXT NOT NULL,  -- extracted frame image on disk
    confidence REAL NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (video_id) REFERENCES video_uploads(id) ON DELETE CASCADE,
    FOREIGN KEY (case_id) REFERENCES missing_persons(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_video_matches_video ON video_matches(video_id);
"#;
