use glam::DMat4;
use volscene_core::model::volume::{matrix_element, matrix_from_rows};
use volscene_core::volumes::precision::{order_of_magnitude, significant_decimals};
use volscene_core::volumes::transform::TransformError;
use volscene_core::{
    ImageData, NodeData, NodeId, NrrdVolumeIo, ScalarType, Scene, SceneNode, VolumeKind,
    VolumeNode, VolumesService,
};

fn add_volume(scene: &mut Scene, kind: VolumeKind, name: &str) -> NodeId {
    let volume = VolumeNode::new(kind).with_image(ImageData::zeroed([8, 8, 4], ScalarType::Short, 1));
    scene.add_node(SceneNode::named(name, NodeData::Volume(volume)))
}

fn service() -> VolumesService<NrrdVolumeIo> {
    VolumesService::new(NrrdVolumeIo::new())
}

#[test]
fn precision_heuristics_match_documented_values() {
    assert_eq!(significant_decimals(0.0, 5), 0);
    assert_eq!(significant_decimals(f64::NAN, 5), -1);
    assert!(significant_decimals(1.0 / 3.0, 5) >= 1);
    assert_eq!(order_of_magnitude(0.0), i32::MIN);
    assert_eq!(order_of_magnitude(999.0), 2);
    assert_eq!(order_of_magnitude(1000.0), 3);
    assert_eq!(order_of_magnitude(0.05), -2);
}

#[test]
fn geometry_report_ignores_sub_epsilon_matrix_noise() {
    let mut scene = Scene::new();
    let first = add_volume(&mut scene, VolumeKind::Scalar, "a");
    let second = add_volume(&mut scene, VolumeKind::Scalar, "b");
    scene
        .volume_mut(&second)
        .expect("second volume")
        .directions[0][1] = 1e-9;

    let service = service();
    assert_eq!(service.compare_volume_geometry_epsilon(), 1e-6);
    assert_eq!(service.compare_volume_geometry(&scene, &first, &second), "");

    scene
        .volume_mut(&second)
        .expect("second volume")
        .directions[0][1] = 1.0;
    let report = service.compare_volume_geometry(&scene, &first, &second);
    assert_eq!(report, "IJKToRAS mismatch at [0, 1] (0 != 1)\n");
}

#[test]
fn geometry_report_describes_missing_inputs() {
    let mut scene = Scene::new();
    let first = add_volume(&mut scene, VolumeKind::Scalar, "a");
    let empty = scene.add_node(SceneNode::named(
        "empty",
        NodeData::Volume(VolumeNode::new(VolumeKind::Scalar)),
    ));
    let service = service();
    assert_eq!(
        service.compare_volume_geometry(&scene, &first, &empty),
        "Null second image data pointer\n"
    );
    assert_eq!(
        service.compare_volume_geometry(&scene, &NodeId::new("missing"), &first),
        "Null first volume node pointer\n"
    );
}

#[test]
fn coarse_epsilon_adds_advisory_and_changes_precision() {
    let mut scene = Scene::new();
    let first = add_volume(&mut scene, VolumeKind::Scalar, "a");
    let second = add_volume(&mut scene, VolumeKind::Scalar, "b");
    let mut service = service();

    service.set_compare_volume_geometry_epsilon(-0.5);
    assert_eq!(service.compare_volume_geometry_epsilon(), 0.5);
    assert_eq!(service.compare_volume_geometry_precision(), 1);
    let report = service.compare_volume_geometry(&scene, &first, &second);
    assert!(report.starts_with("(Minimum spacing for volumes of 1 mismatched with epsilon 0.5,\n"));
}

#[test]
fn created_label_volume_is_valid_for_its_source() {
    let mut scene = Scene::new();
    let source = add_volume(&mut scene, VolumeKind::Scalar, "brain");
    let service = service();

    let label = service
        .create_and_add_label_volume(&mut scene, &source, "brain-label")
        .expect("label volume");
    assert_eq!(
        service.check_for_label_volume_validity(&scene, &source, &label),
        ""
    );
    assert_eq!(
        service.check_for_label_volume_validity(&scene, &source, &source),
        "Label node is not a label map volume\n"
    );
    assert_eq!(
        service.check_for_label_volume_validity(&scene, &source, &NodeId::new("nope")),
        "Null label volume node pointer\n"
    );
}

#[test]
fn fill_from_template_resets_geometry_and_links_a_display() {
    let mut scene = Scene::new();
    let template = add_volume(&mut scene, VolumeKind::Scalar, "template");
    scene.volume_mut(&template).expect("template").spacing = [0.5, 0.5, 3.0];
    let label = scene.add_node(SceneNode::named(
        "seg",
        NodeData::Volume(VolumeNode::new(VolumeKind::LabelMap)),
    ));
    let service = service();

    service
        .fill_label_volume_from_template(&mut scene, &label, &template)
        .expect("fill label");

    let node = scene.node(&label).expect("label node");
    assert_eq!(node.name(), Some("seg"));
    let volume = scene.volume(&label).expect("label volume");
    assert_eq!(volume.spacing, [0.5, 0.5, 3.0]);
    let image = volume.image.as_ref().expect("zero image");
    assert_eq!(image.dimensions, [8, 8, 4]);
    assert!(image.scalars.iter().all(|value| *value == 0.0));
    let display = volume.display_node_id.clone().expect("display created");
    assert_eq!(
        scene.display(&display).expect("display").kind,
        VolumeKind::LabelMap
    );

    assert!(service
        .fill_label_volume_from_template(&mut scene, &template, &label)
        .is_err());
}

#[test]
fn clone_without_image_data_owns_its_later_voxels() {
    let mut scene = Scene::new();
    let source = add_volume(&mut scene, VolumeKind::Scalar, "ct");
    let service = service();

    let clone = service
        .clone_volume_without_image_data(&mut scene, &source, "ct")
        .expect("clone");
    assert_eq!(scene.node(&clone).and_then(|node| node.name()), Some("ct_1"));
    assert!(scene.volume(&clone).expect("clone").image.is_none());

    let mut replacement = ImageData::zeroed([8, 8, 4], ScalarType::Short, 1);
    replacement.scalars[0] = 42.0;
    scene.volume_mut(&clone).expect("clone").image = Some(replacement);

    let original = scene.volume(&source).expect("source");
    assert_eq!(original.image.as_ref().map(|image| image.scalars[0]), Some(0.0));
}

#[test]
fn deep_clone_copies_display_and_drops_storage() {
    let mut scene = Scene::new();
    let source = add_volume(&mut scene, VolumeKind::Scalar, "ct");
    let service = service();
    let label = service
        .create_and_add_label_volume(&mut scene, &source, "ct-label")
        .expect("label");

    let clone = service
        .clone_volume(&mut scene, &label, "copy")
        .expect("clone");
    let original = scene.volume(&label).expect("label");
    let copied = scene.volume(&clone).expect("copy");
    assert_eq!(copied.kind, VolumeKind::LabelMap);
    assert!(copied.storage_node_id.is_none());
    assert_ne!(copied.display_node_id, original.display_node_id);
    assert_eq!(
        scene
            .display(copied.display_node_id.as_ref().expect("clone display"))
            .expect("display")
            .color_node_id,
        scene
            .display(original.display_node_id.as_ref().expect("label display"))
            .expect("display")
            .color_node_id
    );
    assert_eq!(copied.image, original.image);
    assert_eq!(
        scene.node(&clone).and_then(|node| node.attribute("AssociatedNodeID")),
        Some(source.as_str())
    );
}

#[test]
fn centering_moves_origin_to_half_extent() {
    let mut scene = Scene::new();
    let id = add_volume(&mut scene, VolumeKind::Scalar, "v");
    let service = service();
    assert_eq!(
        service.volume_centered_origin(&scene, &id).expect("origin"),
        [-3.5, -3.5, -1.5]
    );
    assert!(service.center_volume(&mut scene, &id).expect("center"));
    assert_eq!(scene.volume(&id).expect("v").origin, [-3.5, -3.5, -1.5]);
}

#[test]
fn legacy_label_formats_are_recognized() {
    let service = service();
    assert!(service.is_legacy_label_format("aparc+aseg.MGZ"));
    assert!(!service.is_legacy_label_format("seg.nrrd"));
}

#[test]
fn registration_between_volumes_composes_legacy_matrices() {
    let mut scene = Scene::new();
    let a = add_volume(&mut scene, VolumeKind::Scalar, "a");
    let b = add_volume(&mut scene, VolumeKind::Scalar, "b");
    let service = service();

    let legacy = service
        .legacy_voxel_to_canonical(&scene, &a)
        .expect("legacy matrix");
    assert_eq!(matrix_element(&legacy, 0, 3), 4.0);
    assert_eq!(matrix_element(&legacy, 1, 3), -2.0);

    let shift = matrix_from_rows([
        [1.0, 0.0, 0.0, 5.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);
    let world = service
        .resolve_cross_tool_registration(&scene, &a, &b, &shift)
        .expect("registration");
    let identity = service
        .resolve_cross_tool_registration(&scene, &a, &b, &DMat4::IDENTITY)
        .expect("identity registration");
    assert!(identity.abs_diff_eq(DMat4::IDENTITY, 1e-12));
    // the legacy frame flips the first axis
    assert!((matrix_element(&world, 0, 3) + 5.0).abs() < 1e-12);
}

#[test]
fn registration_without_voxels_is_missing_geometry() {
    let mut scene = Scene::new();
    let a = add_volume(&mut scene, VolumeKind::Scalar, "a");
    let empty = scene.add_node(SceneNode::named(
        "empty",
        NodeData::Volume(VolumeNode::new(VolumeKind::Scalar)),
    ));
    let error = service()
        .resolve_cross_tool_registration(&scene, &a, &empty, &DMat4::IDENTITY)
        .expect_err("empty volume has no geometry");
    assert!(matches!(&error, TransformError::MissingGeometry { node } if *node == empty));
}
