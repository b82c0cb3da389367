use volscene_core::model::storage::StorageKind;
use volscene_core::scene::remote_io::RemoteIo;
use volscene_core::volumes::geometry::GeometryComparator;
use volscene_core::{
    ImageData, IngestRequest, NodeData, NodeId, NrrdVolumeIo, ScalarType, Scene, SceneNode,
    VolumeKind, VolumeNode, VolumesService,
};

fn add_ramp(scene: &mut Scene, name: &str) -> NodeId {
    let mut image = ImageData::zeroed([3, 2, 2], ScalarType::Float, 1);
    for (index, value) in image.scalars.iter_mut().enumerate() {
        *value = index as f64 * 0.5;
    }
    let mut volume = VolumeNode::new(VolumeKind::Scalar).with_image(image);
    volume.spacing = [0.75, 0.75, 1.5];
    volume.origin = [-10.0, 4.0, 2.5];
    scene.add_node(SceneNode::named(name, NodeData::Volume(volume)))
}

#[test]
fn saved_volume_reads_back_with_same_geometry_and_voxels() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("ramp.nrrd");
    let path_str = path.to_str().expect("utf-8 path");

    let service = VolumesService::new(NrrdVolumeIo::new());
    let mut source_scene = Scene::new();
    let source = add_ramp(&mut source_scene, "ramp");
    service
        .save_archetype_volume(&mut source_scene, path_str, &source)
        .expect("save should write the file");

    let storage_id = source_scene
        .volume(&source)
        .expect("source")
        .storage_node_id
        .clone()
        .expect("save links a storage node");
    let storage = source_scene.storage(&storage_id).expect("storage");
    assert_eq!(storage.kind, StorageKind::VolumeArchetype);
    assert_eq!(storage.file_name.as_deref(), Some(path_str));

    let mut service = VolumesService::new(NrrdVolumeIo::new());
    let mut scene = Scene::new();
    let set = service
        .add_archetype_volume(&mut scene, &IngestRequest::new(path_str))
        .expect("scalar NRRD should load");

    let loaded = scene.volume(&set.node).expect("loaded volume");
    let original = source_scene.volume(&source).expect("original volume");
    assert_eq!(loaded.kind, VolumeKind::Scalar);
    assert_eq!(
        GeometryComparator::default().compare(Some(original), Some(loaded)),
        ""
    );
    assert_eq!(
        loaded.image.as_ref().map(|image| &image.scalars),
        original.image.as_ref().map(|image| &image.scalars)
    );
}

#[test]
fn remote_reference_is_served_from_the_cache_directory() {
    let cache = tempfile::tempdir().expect("cache dir");
    let mut writer_scene = Scene::new();
    let source = add_ramp(&mut writer_scene, "ramp");
    let service = VolumesService::new(NrrdVolumeIo::new());
    let cached = cache.path().join("ramp.nrrd");
    service
        .save_archetype_volume(
            &mut writer_scene,
            cached.to_str().expect("utf-8 path"),
            &source,
        )
        .expect("save into cache");

    let mut scene = Scene::new();
    let mut remote = RemoteIo::new();
    remote.cache.set_remote_cache_directory(cache.path());
    scene.set_remote_io(remote);

    let mut service = VolumesService::new(NrrdVolumeIo::new());
    let set = service
        .add_archetype_volume(
            &mut scene,
            &IngestRequest::new("https://example.org/data/ramp.nrrd?download=1"),
        )
        .expect("cached remote file should load");

    let storage = scene.storage(&set.storage).expect("storage");
    assert_eq!(
        storage.uri.as_deref(),
        Some("https://example.org/data/ramp.nrrd?download=1")
    );
    assert!(storage.file_name.is_none());
    assert!(scene
        .remote_io()
        .expect("target keeps its remote io")
        .data_io
        .transfers()
        .is_empty());
}

#[test]
fn missing_file_reports_nrrd_errors() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("absent.nrrd");
    let mut service = VolumesService::new(NrrdVolumeIo::new());
    let mut scene = Scene::new();
    let error = service
        .add_archetype_volume(
            &mut scene,
            &IngestRequest::new(path.to_str().expect("utf-8 path")),
        )
        .expect_err("absent file");
    assert!(error.to_string().contains("absent.nrrd"));
    assert!(service.active_volume().is_none());
}

#[test]
fn oversized_header_fails_every_trial_without_panicking() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("huge.nrrd");
    std::fs::write(
        &path,
        "NRRD0004\ntype: short\ndimension: 3\nsizes: 4294967296 4294967296 4294967296\nencoding: raw\n\n",
    )
    .expect("write header");

    let mut service = VolumesService::new(NrrdVolumeIo::new());
    let mut scene = Scene::new();
    let before = scene.node_count();
    let error = service
        .add_archetype_volume(
            &mut scene,
            &IngestRequest::new(path.to_str().expect("utf-8 path")),
        )
        .expect_err("overflowing sizes");
    assert!(error.to_string().contains("sizes overflow"));
    assert_eq!(scene.node_count(), before);
}

#[test]
fn undeclared_component_axis_is_read_by_archetype_vector_storage() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("rgb.nrrd");
    let values: Vec<String> = (0..12).map(|value| value.to_string()).collect();
    std::fs::write(
        &path,
        format!(
            "NRRD0004\ntype: float\ndimension: 4\nsizes: 3 2 2 1\nencoding: ascii\n\n{}\n",
            values.join(" ")
        ),
    )
    .expect("write volume");

    let mut service = VolumesService::new(NrrdVolumeIo::new());
    let mut scene = Scene::new();
    let set = service
        .add_archetype_volume(
            &mut scene,
            &IngestRequest::new(path.to_str().expect("utf-8 path")),
        )
        .expect("archetype vector storage accepts the file");

    let volume = scene.volume(&set.node).expect("vector volume");
    assert_eq!(volume.kind, VolumeKind::Vector);
    assert_eq!(volume.image.as_ref().map(|image| image.components), Some(3));
    assert_eq!(volume.dimensions(), Some([2, 2, 1]));
    assert_eq!(
        scene.storage(&set.storage).expect("storage").kind,
        StorageKind::VolumeArchetype
    );
}
